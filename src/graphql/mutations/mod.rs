mod account;
mod admin;
mod auth;

use async_graphql::MergedObject;

pub use account::AccountMutations;
pub use admin::AdminMutations;
pub use auth::AuthMutations;

#[derive(MergedObject, Default)]
pub struct MutationRoot(AuthMutations, AccountMutations, AdminMutations);
