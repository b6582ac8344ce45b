//! `/humans` endpoints: registration, browser login and every challenge
//! issue/verify pair.

pub(crate) mod authenticate;
pub(crate) mod delete;
pub(crate) mod email;
pub(crate) mod password;
pub(crate) mod recover;
pub(crate) mod register;
pub(crate) mod totp;
pub(crate) mod types;
