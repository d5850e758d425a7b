//! Discord IPC wire layer: protocol types, frame codec and endpoint transport

pub mod codec;
pub mod protocol;
pub mod transport;

pub use codec::{decode, encode, encode_json, Frame, FrameReader};
pub use protocol::{
    constants, Command, ErrorPayload, HandshakePayload, IpcConfig, IpcMessage, IpcResponse, Opcode,
};
pub use transport::{
    connect, default_connector, endpoint_name, BoundConnection, Connection, Connector,
    DiscoveredEndpoint, EndpointHint, ReadOutcome,
};
