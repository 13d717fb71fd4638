//! Chain implementations shipped with chainsim

pub mod ethereum;
pub mod filecoin;
