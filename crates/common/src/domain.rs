mod content;
mod mac_address;
mod message;
mod publish;
mod record;
mod result;

pub use content::*;
pub use mac_address::*;
pub use message::*;
pub use publish::*;
pub use record::*;
pub use result::*;
