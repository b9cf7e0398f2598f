pub mod invitation;
pub mod project;
pub mod user;

pub use invitation::{Invitation, InvitationStatus};
pub use project::{Project, ProjectInput, ProjectMember, ProjectRole};
pub use user::User;
