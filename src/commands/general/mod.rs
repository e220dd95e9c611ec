pub mod botinfo;
pub mod diagnose;
pub mod invite;
pub mod ownerinfo;
pub mod ping;
