//! System-message management: ownership rules, the non-deletable default,
//! and the search/time-sense toggles.

use crate::DbConn;
use crate::error::{Error, Result};
use crate::models::requests::{CreateSystemMessageRequest, UpdateSystemMessageRequest};
use crate::models::system_messages::{
    DEFAULT_SYSTEM_MESSAGE_NAME, SystemMessage, SystemMessageView,
};
use crate::models::users::User;
use crate::queries::system_messages as queries;

/// Body given to the default system message when it has to be recreated.
const DEFAULT_SYSTEM_MESSAGE_CONTENT: &str =
    "You are a knowledgeable and helpful assistant. Answer clearly and concisely, and say \
     so when you do not know.";
const DEFAULT_MODEL_NAME: &str = "gpt-4o-2024-08-06";

pub async fn create(
    conn: &mut DbConn,
    data: CreateSystemMessageRequest,
    user: &User,
) -> Result<SystemMessage> {
    if data.name.trim().is_empty() {
        return Err(Error::Validation("Name is required.".to_string()));
    }

    let message = queries::insert(
        conn,
        data.name.trim(),
        &data.content,
        &data.description,
        &data.model_name,
        data.temperature,
        Some(user.id),
        data.enable_web_search,
        data.enable_time_sense,
    )
    .await?;
    tracing::info!(
        "Created new system message: {} (id={}) for user {}",
        message.name,
        message.id,
        user.id
    );
    Ok(message)
}

/// List the messages a user can see (their own plus system defaults), or
/// everything for the admin view. The default message is created if it has
/// gone missing.
pub async fn get_all(conn: &mut DbConn, user_id: Option<i32>) -> Result<Vec<SystemMessageView>> {
    let mut messages = queries::list_visible(conn, user_id).await?;

    if user_id.is_some()
        && !messages
            .iter()
            .any(|m| m.name == DEFAULT_SYSTEM_MESSAGE_NAME)
    {
        if let Some(default) = ensure_default_exists(conn).await? {
            messages.push(default);
        }
    }

    Ok(messages
        .into_iter()
        .map(|message| {
            let is_default = message.is_default();
            let is_editable = match user_id {
                Some(user_id) => message.created_by == Some(user_id),
                None => true,
            };
            SystemMessageView {
                message,
                is_default,
                is_editable,
            }
        })
        .collect())
}

/// The invariant: one NULL-owner "Default System Message" always exists.
pub async fn ensure_default_exists(conn: &mut DbConn) -> Result<Option<SystemMessage>> {
    if let Some(existing) = queries::get_default_by_name(conn, DEFAULT_SYSTEM_MESSAGE_NAME).await? {
        return Ok(Some(existing));
    }

    let created = queries::insert(
        conn,
        DEFAULT_SYSTEM_MESSAGE_NAME,
        DEFAULT_SYSTEM_MESSAGE_CONTENT,
        "Default system message for general conversations",
        DEFAULT_MODEL_NAME,
        0.7,
        None,
        false,
        true,
    )
    .await?;
    tracing::info!("Created default system message");
    Ok(Some(created))
}

pub async fn get_by_id(
    conn: &mut DbConn,
    message_id: i32,
    user_id: Option<i32>,
) -> Result<SystemMessageView> {
    let message = queries::get_by_id(conn, message_id)
        .await?
        .ok_or_else(|| Error::NotFound("System message not found".to_string()))?;

    if let Some(user_id) = user_id {
        if message.created_by.is_some() && message.created_by != Some(user_id) {
            return Err(Error::Forbidden("Access denied".to_string()));
        }
    }

    let is_default = message.is_default();
    Ok(SystemMessageView {
        message,
        is_default,
        is_editable: true,
    })
}

pub async fn update(
    conn: &mut DbConn,
    message_id: i32,
    data: UpdateSystemMessageRequest,
    user: &User,
) -> Result<SystemMessage> {
    let mut message = queries::get_by_id(conn, message_id)
        .await?
        .ok_or_else(|| Error::NotFound("System message not found".to_string()))?;

    if message.is_default() && !user.is_admin {
        return Err(Error::Forbidden(
            "Only admins can update system defaults".to_string(),
        ));
    }
    if !message.can_modify(user.id, user.is_admin) {
        return Err(Error::Forbidden(
            "You can only update your own system messages".to_string(),
        ));
    }

    if let Some(name) = data.name {
        message.name = name;
    }
    if let Some(content) = data.content {
        message.content = content;
    }
    if let Some(description) = data.description {
        message.description = Some(description);
    }
    if let Some(model_name) = data.model_name {
        message.model_name = Some(model_name);
    }
    if let Some(temperature) = data.temperature {
        message.temperature = Some(temperature);
    }
    if let Some(enable_web_search) = data.enable_web_search {
        message.enable_web_search = enable_web_search;
    }
    if let Some(enable_time_sense) = data.enable_time_sense {
        message.enable_time_sense = enable_time_sense;
    }

    let updated = queries::update(conn, &message).await?;
    tracing::info!("Updated system message {} by user {}", message_id, user.id);
    Ok(updated)
}

pub async fn delete(conn: &mut DbConn, message_id: i32, user: &User) -> Result<()> {
    let message = queries::get_by_id(conn, message_id)
        .await?
        .ok_or_else(|| Error::NotFound("System message not found".to_string()))?;

    if message.is_default() {
        return Err(Error::Forbidden(
            "Cannot delete system default messages".to_string(),
        ));
    }
    if message.name == DEFAULT_SYSTEM_MESSAGE_NAME {
        return Err(Error::Forbidden(
            "Cannot delete the default system message".to_string(),
        ));
    }
    if !message.can_modify(user.id, user.is_admin) {
        return Err(Error::Forbidden(
            "You can only delete your own system messages".to_string(),
        ));
    }

    queries::delete(conn, message_id).await?;
    tracing::info!("Deleted system message {} by user {}", message_id, user.id);
    Ok(())
}

pub async fn toggle_search(
    conn: &mut DbConn,
    message_id: i32,
    enable_web_search: bool,
    enable_deep_search: bool,
    user: &User,
) -> Result<SystemMessage> {
    let mut message = queries::get_by_id(conn, message_id)
        .await?
        .ok_or_else(|| Error::NotFound("System message not found".to_string()))?;

    if message.is_default() && !user.is_admin {
        return Err(Error::Forbidden(
            "Only admins can modify system defaults".to_string(),
        ));
    }
    if !message.can_modify(user.id, user.is_admin) {
        return Err(Error::Forbidden(
            "You can only modify your own system messages".to_string(),
        ));
    }

    message.enable_web_search = enable_web_search;
    message.enable_deep_search = enable_deep_search;
    let updated = queries::update(conn, &message).await?;
    tracing::info!(
        "Search settings updated for system message {} by user {}",
        message_id,
        user.id
    );
    Ok(updated)
}

pub async fn get_default_model_name(conn: &mut DbConn) -> Result<Option<String>> {
    let message = queries::get_by_name(conn, DEFAULT_SYSTEM_MESSAGE_NAME).await?;
    match message {
        Some(message) => Ok(message.model_name),
        None => Err(Error::NotFound(
            "Default system message not found".to_string(),
        )),
    }
}
