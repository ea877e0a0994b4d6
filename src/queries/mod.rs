pub mod conversations;
pub mod system_messages;
pub mod uploaded_files;
pub mod users;
