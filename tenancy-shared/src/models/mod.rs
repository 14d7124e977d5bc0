/// Entity types for the membership model
///
/// Organisation → Role → Member ← User. Each entity is a plain data struct;
/// persistence lives behind [`crate::store`].
///
/// # Models
///
/// - `audit`: Status/settings/timestamps embedded by composition
/// - `user`: User accounts
/// - `organisation`: Tenants
/// - `role`: Organisation-scoped role labels
/// - `member`: User ↔ organisation binding with a role
///
/// Lookups take typed keys ([`user::UserLookup`], [`role::RoleKey`],
/// [`member::MemberKey`]) rather than ad-hoc field maps.

pub mod audit;
pub mod member;
pub mod organisation;
pub mod role;
pub mod user;

pub use audit::Audit;
pub use member::{CreateMember, Member, MemberKey};
pub use organisation::{CreateOrganisation, Organisation};
pub use role::{CreateRole, Role, RoleKey};
pub use user::{CreateUser, User, UserLookup};
