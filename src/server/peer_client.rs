use crate::actor::ActorClient;
use crate::grpc::grpc_raft_client::GrpcRaftClient;
use crate::raft::{MemberId, RaftRequest, RaftResponse, Transport};
use crate::server::convert::{self, ConvertError};
use std::collections::HashMap;
use std::time::Duration;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid peer uri")]
    InvalidUri(#[from] uri::InvalidUri),
    #[error("failed to set up connection")]
    ConnectFailure(#[from] tonic::transport::Error),
}

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("malformed message: {0}")]
    Convert(#[from] ConvertError),
}

/// GrpcTransport sends the node's requests to its peers over gRPC.
///
/// Every send runs on its own task; the answer comes back to the partition actor as an event.
/// Failed or timed out calls are only logged: the node notices the missing answer and retries.
pub struct GrpcTransport {
    logger: slog::Logger,
    local_partition: ActorClient,
    timeout: Duration,
    clients: HashMap<MemberId, GrpcRaftClient<Channel>>,
}

impl GrpcTransport {
    pub fn new(logger: slog::Logger, local_partition: ActorClient, timeout: Duration) -> Self {
        GrpcTransport {
            logger,
            local_partition,
            timeout,
            clients: HashMap::new(),
        }
    }

    fn client(&mut self, to: &MemberId) -> Result<GrpcRaftClient<Channel>, ConnectError> {
        if let Some(client) = self.clients.get(to) {
            return Ok(client.clone());
        }

        slog::debug!(self.logger, "Connecting to {} ...", to.uri());
        let channel = Endpoint::from_shared(to.uri())?
            .timeout(self.timeout)
            .connect_lazy()?;
        let client = GrpcRaftClient::new(channel);
        self.clients.insert(to.clone(), client.clone());
        Ok(client)
    }
}

impl Transport for GrpcTransport {
    fn send(&mut self, to: &MemberId, request: RaftRequest) {
        let client = match self.client(to) {
            Ok(client) => client,
            Err(e) => {
                slog::warn!(self.logger, "No client for {}: {}", to, e);
                return;
            }
        };

        let logger = self.logger.clone();
        let local_partition = self.local_partition.clone();
        let timeout = self.timeout;
        let to = to.clone();
        tokio::spawn(async move {
            let name = request.name();
            match tokio::time::timeout(timeout, call(client, request)).await {
                Ok(Ok(response)) => {
                    if local_partition.deliver_response(to, response).await.is_err() {
                        slog::debug!(logger, "Dropping {} response, partition has exited", name);
                    }
                }
                Ok(Err(e)) => slog::debug!(logger, "{} to {} failed: {}", name, to, e),
                Err(_) => slog::debug!(logger, "{} to {} timed out", name, to),
            }
        });
    }
}

async fn call(mut client: GrpcRaftClient<Channel>, request: RaftRequest) -> Result<RaftResponse, CallError> {
    let response = match request {
        RaftRequest::Vote(request) => {
            let reply = client.vote(convert::vote_request_to_proto(&request)).await?;
            RaftResponse::Vote(convert::vote_response_from_proto(reply.into_inner()))
        }
        RaftRequest::Append(request) => {
            let reply = client.append(convert::append_request_to_proto(&request)?).await?;
            RaftResponse::Append(convert::append_response_from_proto(reply.into_inner()))
        }
        RaftRequest::Join(request) => {
            let reply = client.join(convert::join_request_to_proto(&request)).await?;
            RaftResponse::Join(convert::join_response_from_proto(reply.into_inner())?)
        }
        RaftRequest::Leave(request) => {
            let reply = client.leave(convert::leave_request_to_proto(&request)).await?;
            RaftResponse::Leave(convert::leave_response_from_proto(reply.into_inner())?)
        }
        RaftRequest::Configure(request) => {
            let reply = client.configure(convert::configure_request_to_proto(&request)).await?;
            RaftResponse::Configure(convert::configure_response_from_proto(reply.into_inner()))
        }
        RaftRequest::InstallSnapshot(request) => {
            let reply = client
                .install_snapshot(convert::install_snapshot_request_to_proto(&request))
                .await?;
            RaftResponse::InstallSnapshot(convert::install_snapshot_response_from_proto(reply.into_inner()))
        }
    };
    Ok(response)
}
