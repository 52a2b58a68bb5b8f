// bulbsync-api: wire types and transport channels for the hub translator.
//
// Everything that touches the network lives here: the NVA wire shape, the
// HTTP hub channel, the HTTP device proxy client, and the message bus
// WebSocket stream. `bulbsync-core` builds on the traits, never on reqwest.

pub mod bus;
pub mod device;
pub mod error;
pub mod hub;
pub mod nva;
pub mod transport;

pub use bus::{
    BatchedNva, BusHandle, BusMessage, BusReplier, BusReply, ObservationRequest, ReconnectConfig,
};
pub use device::{DeviceClient, HttpDeviceClient};
pub use error::Error;
pub use hub::{ExecuteRequest, HttpHubChannel, HubChannel};
pub use nva::{HubThing, Nva, NvaErrorBody, NvaResponse, NvaStatus, SourceRef};
pub use transport::TransportConfig;
