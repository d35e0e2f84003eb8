pub mod client;
pub mod roles;

pub use client::{
    authorize_url, redirect_uri, GeniusAccount, GeniusApi, GeniusClient, GeniusUser,
};
pub use roles::map_genius_roles;
