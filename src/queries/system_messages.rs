use chrono::Utc;

use crate::{
    DbConn,
    error::{Error, Result},
    models::system_messages::SystemMessage,
};

const COLUMNS: &str = "id, name, content, description, model_name, temperature, created_by, \
                       created_at, updated_at, enable_web_search, enable_deep_search, \
                       enable_time_sense";

pub async fn get_by_id(conn: &mut DbConn, id: i32) -> Result<Option<SystemMessage>> {
    let message = sqlx::query_as::<_, SystemMessage>(&format!(
        "SELECT {} FROM system_messages WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(message)
}

/// List a user's own messages plus the NULL-owner system defaults, ordered
/// by name. `user_id = None` is the admin view over everything.
pub async fn list_visible(conn: &mut DbConn, user_id: Option<i32>) -> Result<Vec<SystemMessage>> {
    let messages = match user_id {
        Some(user_id) => {
            sqlx::query_as::<_, SystemMessage>(&format!(
                "SELECT {} FROM system_messages \
                 WHERE created_by = $1 OR created_by IS NULL ORDER BY name",
                COLUMNS
            ))
            .bind(user_id)
            .fetch_all(conn)
            .await
        }
        None => {
            sqlx::query_as::<_, SystemMessage>(&format!(
                "SELECT {} FROM system_messages ORDER BY name",
                COLUMNS
            ))
            .fetch_all(conn)
            .await
        }
    }
    .map_err(Error::Sqlx)?;
    Ok(messages)
}

pub async fn get_default_by_name(
    conn: &mut DbConn,
    name: &str,
) -> Result<Option<SystemMessage>> {
    let message = sqlx::query_as::<_, SystemMessage>(&format!(
        "SELECT {} FROM system_messages WHERE name = $1 AND created_by IS NULL",
        COLUMNS
    ))
    .bind(name)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(message)
}

pub async fn get_by_name(conn: &mut DbConn, name: &str) -> Result<Option<SystemMessage>> {
    let message = sqlx::query_as::<_, SystemMessage>(&format!(
        "SELECT {} FROM system_messages WHERE name = $1",
        COLUMNS
    ))
    .bind(name)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(message)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    conn: &mut DbConn,
    name: &str,
    content: &str,
    description: &str,
    model_name: &str,
    temperature: f64,
    created_by: Option<i32>,
    enable_web_search: bool,
    enable_time_sense: bool,
) -> Result<SystemMessage> {
    let now = Utc::now();
    let message = sqlx::query_as::<_, SystemMessage>(&format!(
        "INSERT INTO system_messages \
         (name, content, description, model_name, temperature, created_by, created_at, \
          updated_at, enable_web_search, enable_deep_search, enable_time_sense) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, false, $9) \
         RETURNING {}",
        COLUMNS
    ))
    .bind(name)
    .bind(content)
    .bind(description)
    .bind(model_name)
    .bind(temperature)
    .bind(created_by)
    .bind(now)
    .bind(enable_web_search)
    .bind(enable_time_sense)
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(message)
}

pub async fn update(conn: &mut DbConn, message: &SystemMessage) -> Result<SystemMessage> {
    let updated = sqlx::query_as::<_, SystemMessage>(&format!(
        "UPDATE system_messages SET name = $2, content = $3, description = $4, \
         model_name = $5, temperature = $6, enable_web_search = $7, enable_deep_search = $8, \
         enable_time_sense = $9, updated_at = $10 WHERE id = $1 RETURNING {}",
        COLUMNS
    ))
    .bind(message.id)
    .bind(&message.name)
    .bind(&message.content)
    .bind(&message.description)
    .bind(&message.model_name)
    .bind(message.temperature)
    .bind(message.enable_web_search)
    .bind(message.enable_deep_search)
    .bind(message.enable_time_sense)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(updated)
}

pub async fn delete(conn: &mut DbConn, id: i32) -> Result<()> {
    sqlx::query("DELETE FROM system_messages WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(())
}
