//! Thingbus LoRa adapter
//!
//! Translates between LoRa network identifiers (device EUIs, application
//! ids) and Thingbus thing and channel ids. The route maps it reads are
//! filled by the lifecycle subscription running in the same process, over
//! the store picked by [`open_store`].

pub mod adapter;
pub mod store;

pub use adapter::{AdapterError, ChannelRoute, DeviceRoute, LoraAdapter};
pub use store::{Stores, open_store};
