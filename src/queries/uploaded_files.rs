use chrono::Utc;

use crate::{
    DbConn,
    error::{Error, Result},
    models::uploaded_files::UploadedFile,
};

const COLUMNS: &str = "id, user_id, original_filename, file_path, processed_text_path, \
                       upload_timestamp, file_size, mime_type, system_message_id";

pub async fn get_by_id(conn: &mut DbConn, id: &str) -> Result<Option<UploadedFile>> {
    let file = sqlx::query_as::<_, UploadedFile>(&format!(
        "SELECT {} FROM uploaded_files WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(file)
}

pub async fn list_for_system_message(
    conn: &mut DbConn,
    system_message_id: i32,
) -> Result<Vec<UploadedFile>> {
    let files = sqlx::query_as::<_, UploadedFile>(&format!(
        "SELECT {} FROM uploaded_files WHERE system_message_id = $1 ORDER BY upload_timestamp",
        COLUMNS
    ))
    .bind(system_message_id)
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(files)
}

pub async fn insert(
    conn: &mut DbConn,
    id: &str,
    user_id: i32,
    original_filename: &str,
    file_path: &str,
    system_message_id: i32,
    file_size: i64,
    mime_type: Option<&str>,
) -> Result<UploadedFile> {
    let file = sqlx::query_as::<_, UploadedFile>(&format!(
        "INSERT INTO uploaded_files \
         (id, user_id, original_filename, file_path, system_message_id, file_size, \
          mime_type, upload_timestamp) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
        COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .bind(original_filename)
    .bind(file_path)
    .bind(system_message_id)
    .bind(file_size)
    .bind(mime_type)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(file)
}

pub async fn set_processed_text_path(
    conn: &mut DbConn,
    id: &str,
    processed_text_path: &str,
) -> Result<()> {
    sqlx::query("UPDATE uploaded_files SET processed_text_path = $2 WHERE id = $1")
        .bind(id)
        .bind(processed_text_path)
        .execute(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(())
}

pub async fn delete(conn: &mut DbConn, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM uploaded_files WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(result.rows_affected() > 0)
}
