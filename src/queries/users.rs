use crate::{
    DbConn,
    error::{Error, Result},
    models::users::User,
};

const USER_COLUMNS: &str =
    "id, username, email, is_admin, status, timezone, created_at, updated_at, last_login";

pub async fn get_user_by_id(conn: &mut DbConn, user_id: i32) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(user)
}
