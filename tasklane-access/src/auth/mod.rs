/// Authorization for projects and tasks
///
/// Principals arrive already authenticated; this module only decides what
/// they may do.
///
/// # Modules
///
/// - [`roles`]: Resolves a principal's role in a project
/// - [`permissions`]: The role × action × ownership matrix and its guards
/// - [`visibility`]: Narrows bulk task lists per role
/// - [`token`]: Invitation token generation and hashing
///
/// # Security Features
///
/// - **Closed roles**: every match over [`crate::models::ProjectRole`] is exhaustive
/// - **Fail closed**: a resource that can't be loaded is denied
/// - **Uniform denial**: "no role" and "role too low" produce the same error
/// - **Hashed tokens**: only SHA-256 digests of invitation tokens are stored

pub mod permissions;
pub mod roles;
pub mod token;
pub mod visibility;
