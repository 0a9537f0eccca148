use crate::actor::ActorClient;
use crate::grpc::grpc_raft_server::{GrpcRaft, GrpcRaftServer};
use crate::grpc::{
    ProtoAppendReq, ProtoAppendResult, ProtoConfigureReq, ProtoConfigureResult, ProtoInstallSnapshotReq,
    ProtoInstallSnapshotResult, ProtoJoinReq, ProtoJoinResult, ProtoLeaveReq, ProtoLeaveResult, ProtoVoteReq,
    ProtoVoteResult,
};
use crate::raft::{RaftRequest, RaftResponse};
use crate::server::convert::{self, ConvertError};
use crate::server::RpcServerShutdownSignal;
use std::net::SocketAddr;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer is the type that implements the Raft gRPC interface.
pub struct RpcServer {
    logger: slog::Logger,
    local_partition: ActorClient,
}

impl RpcServer {
    pub fn new(logger: slog::Logger, local_partition: ActorClient) -> Self {
        RpcServer {
            logger,
            local_partition,
        }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcRaftServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn forward(&self, request: RaftRequest) -> Result<RaftResponse, Status> {
        self.local_partition
            .handle_request(request)
            .await
            .map_err(|_| Status::unavailable("Server internal partition task has exited"))
    }

    fn invalid(e: ConvertError) -> Status {
        Status::invalid_argument(e.to_string())
    }

    fn mismatched(response: RaftResponse) -> Status {
        Status::internal(format!("Partition answered with an unexpected {:?}", response))
    }
}

#[async_trait::async_trait]
impl GrpcRaft for RpcServer {
    async fn vote(&self, rpc_request_wrapped: Request<ProtoVoteReq>) -> Result<Response<ProtoVoteResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);

        let request = convert::vote_request_from_proto(rpc_request).map_err(Self::invalid)?;
        let rpc_result = match self.forward(RaftRequest::Vote(request)).await? {
            RaftResponse::Vote(response) => convert::vote_response_to_proto(response),
            other => return Err(Self::mismatched(other)),
        };

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);
        Ok(Response::new(rpc_result))
    }

    async fn append(&self, rpc_request_wrapped: Request<ProtoAppendReq>) -> Result<Response<ProtoAppendResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(
            self.logger,
            "ServerWire - Append term {} prev {} with {} entries",
            rpc_request.term,
            rpc_request.prev_log_index,
            rpc_request.entries.len()
        );

        let request = convert::append_request_from_proto(rpc_request).map_err(Self::invalid)?;
        let rpc_result = match self.forward(RaftRequest::Append(request)).await? {
            RaftResponse::Append(response) => convert::append_response_to_proto(response),
            other => return Err(Self::mismatched(other)),
        };

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);
        Ok(Response::new(rpc_result))
    }

    async fn join(&self, rpc_request_wrapped: Request<ProtoJoinReq>) -> Result<Response<ProtoJoinResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);

        let request = convert::join_request_from_proto(rpc_request).map_err(Self::invalid)?;
        let rpc_result = match self.forward(RaftRequest::Join(request)).await? {
            RaftResponse::Join(response) => convert::join_response_to_proto(response),
            other => return Err(Self::mismatched(other)),
        };

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);
        Ok(Response::new(rpc_result))
    }

    async fn leave(&self, rpc_request_wrapped: Request<ProtoLeaveReq>) -> Result<Response<ProtoLeaveResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);

        let request = convert::leave_request_from_proto(rpc_request).map_err(Self::invalid)?;
        let rpc_result = match self.forward(RaftRequest::Leave(request)).await? {
            RaftResponse::Leave(response) => convert::leave_response_to_proto(response),
            other => return Err(Self::mismatched(other)),
        };

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);
        Ok(Response::new(rpc_result))
    }

    async fn configure(
        &self,
        rpc_request_wrapped: Request<ProtoConfigureReq>,
    ) -> Result<Response<ProtoConfigureResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);

        let request = convert::configure_request_from_proto(rpc_request).map_err(Self::invalid)?;
        let rpc_result = match self.forward(RaftRequest::Configure(request)).await? {
            RaftResponse::Configure(response) => convert::configure_response_to_proto(response),
            other => return Err(Self::mismatched(other)),
        };

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);
        Ok(Response::new(rpc_result))
    }

    async fn install_snapshot(
        &self,
        rpc_request_wrapped: Request<ProtoInstallSnapshotReq>,
    ) -> Result<Response<ProtoInstallSnapshotResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();
        slog::debug!(
            self.logger,
            "ServerWire - InstallSnapshot term {} at {} ({} bytes)",
            rpc_request.term,
            rpc_request.snapshot_index,
            rpc_request.data.len()
        );

        let request = convert::install_snapshot_request_from_proto(rpc_request).map_err(Self::invalid)?;
        let rpc_result = match self.forward(RaftRequest::InstallSnapshot(request)).await? {
            RaftResponse::InstallSnapshot(response) => convert::install_snapshot_response_to_proto(response),
            other => return Err(Self::mismatched(other)),
        };

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);
        Ok(Response::new(rpc_result))
    }
}
