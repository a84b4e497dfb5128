//! Duplex byte transport abstraction for camera streaming links.
//!
//! Provides a unified interface over the transports a camera device can be
//! reached through:
//! - Stream sockets (Bluetooth SPP, or TCP / Unix sockets on a host)
//! - Notification-based links (BLE GATT characteristics fed by a platform stack)
//!
//! This is the lowest layer of camlink. Everything else builds on top of
//! the [`Transport`] and [`Connector`] traits provided here.

pub mod error;
pub mod notify;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use notify::{notification_pair, LinkEvent, NotificationLink, NotificationTransport};
pub use stream::{StreamTransport, TcpConnector};
pub use traits::{Connector, DeviceHandle, Transport};

#[cfg(unix)]
pub use stream::UnixConnector;
