mod convert;
mod peer_client;
mod server;
mod shutdown;

pub use peer_client::GrpcTransport;
pub use server::RpcServer;
pub use shutdown::shutdown_signal;
pub use shutdown::RpcServerShutdownHandle;
pub use shutdown::RpcServerShutdownSignal;
