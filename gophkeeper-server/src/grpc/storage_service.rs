use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

use gophkeeper_core::proto::resource_operation_data::{Data, DataChunk, ResourceMeta};
use gophkeeper_core::proto::storage_server::Storage;
use gophkeeper_core::proto::{
    resource_operation_response, ListRequest, Resource, ResourceOperationData,
    ResourceOperationResponse,
};

use crate::auth::AuthData;
use crate::storage::{ResourceId, ResourceStore, ResourceWriter, UserId};

/// Streaming resource endpoints. Every call expects the auth middleware to
/// have placed an `AuthData` in the request extensions.
pub struct StorageService {
    store: Arc<dyn ResourceStore>,
    send_chunk_size: usize,
}

/// Add is a small explicit state machine: frames before the meta frame are a
/// protocol violation, frames after it stream into the write handle.
enum AddState {
    AwaitMeta,
    Streaming {
        writer: Box<dyn ResourceWriter>,
        expected: u64,
        received: u64,
    },
}

impl StorageService {
    pub fn new(store: Arc<dyn ResourceStore>, send_chunk_size: usize) -> Self {
        Self {
            store,
            send_chunk_size,
        }
    }
}

/// Pull the authenticated identity out of the request extensions.
fn require_auth<T>(request: &Request<T>) -> Result<UserId, Status> {
    let auth = request
        .extensions()
        .get::<AuthData>()
        .ok_or_else(|| Status::unauthenticated("auth token missed"))?;

    auth.user_id
        .parse()
        .map_err(|_| Status::unauthenticated("bad user id"))
}

fn meta_frame(salt: Option<Vec<u8>>, size: Option<u64>) -> ResourceOperationData {
    ResourceOperationData {
        data: Some(Data::Meta(ResourceMeta {
            salt,
            resource_byte_size: size,
        })),
    }
}

fn chunk_frame(data: Vec<u8>) -> ResourceOperationData {
    ResourceOperationData {
        data: Some(Data::Chunk(DataChunk { data })),
    }
}

#[tonic::async_trait]
impl Storage for StorageService {
    async fn add(
        &self,
        request: Request<Streaming<ResourceOperationData>>,
    ) -> Result<Response<ResourceOperationResponse>, Status> {
        let user = require_auth(&request)?;
        let mut stream = request.into_inner();

        let mut state = AddState::AwaitMeta;

        while let Some(frame) = stream.message().await? {
            match frame.data {
                Some(Data::Meta(meta)) => match state {
                    AddState::AwaitMeta => {
                        let expected = meta.resource_byte_size.ok_or_else(|| {
                            Status::invalid_argument("resource byte size must be specified")
                        })?;

                        let writer = self
                            .store
                            .create(user, &meta.salt.unwrap_or_default())
                            .await
                            .map_err(Status::from)?;

                        state = AddState::Streaming {
                            writer,
                            expected,
                            received: 0,
                        };
                    }
                    AddState::Streaming { .. } => {
                        return Err(Status::failed_precondition(
                            "meta information has already been received",
                        ));
                    }
                },
                Some(Data::Chunk(chunk)) => match &mut state {
                    AddState::AwaitMeta => {
                        return Err(Status::failed_precondition(
                            "must start with meta information",
                        ));
                    }
                    AddState::Streaming {
                        writer,
                        expected,
                        received,
                    } => {
                        *received += chunk.data.len() as u64;
                        if *received > *expected {
                            return Err(Status::out_of_range("data is larger than expected"));
                        }

                        writer.write(&chunk.data).await.map_err(Status::from)?;
                    }
                },
                None => return Err(Status::invalid_argument("empty operation frame")),
            }
        }

        // Half-close: commit what was streamed.
        match state {
            AddState::AwaitMeta => Err(Status::failed_precondition(
                "must start with meta information",
            )),
            AddState::Streaming { writer, .. } => {
                let id = writer.id();
                writer.commit().await.map_err(Status::from)?;

                tracing::debug!(resource_id = %id, user_id = %user, "resource stored");

                Ok(Response::new(ResourceOperationResponse {
                    result: Some(resource_operation_response::Result::Resource(Resource {
                        id: Some(id.to_string()),
                        data: None,
                        is_deleted: None,
                    })),
                }))
            }
        }
    }

    type ListStream = Pin<Box<dyn Stream<Item = Result<Resource, Status>> + Send>>;

    async fn list(
        &self,
        request: Request<ListRequest>,
    ) -> Result<Response<Self::ListStream>, Status> {
        let user = require_auth(&request)?;

        let entries = self.store.list(user).await.map_err(Status::from)?;

        let frames: Vec<Result<Resource, Status>> = entries
            .into_iter()
            .map(|e| {
                Ok(Resource {
                    id: Some(e.id.to_string()),
                    data: None,
                    is_deleted: None,
                })
            })
            .collect();

        Ok(Response::new(Box::pin(tokio_stream::iter(frames))))
    }

    type GetStream = Pin<Box<dyn Stream<Item = Result<ResourceOperationData, Status>> + Send>>;

    async fn get(&self, request: Request<Resource>) -> Result<Response<Self::GetStream>, Status> {
        let user = require_auth(&request)?;
        let res = request.into_inner();

        let id: ResourceId = res
            .id
            .ok_or_else(|| Status::invalid_argument("resource id is empty"))?
            .parse()
            .map_err(|_| Status::invalid_argument("resource id is malformed"))?;

        let mut reader = self.store.open(user, id).await.map_err(Status::from)?;

        let chunk_size = self.send_chunk_size;
        let (tx, rx) = tokio::sync::mpsc::channel(4);

        // Contract: salt first, then data, then the byte count as a trailer.
        tokio::spawn(async move {
            let salt = reader.salt().to_vec();
            if tx.send(Ok(meta_frame(Some(salt), None))).await.is_err() {
                return;
            }

            let mut sent = 0u64;
            loop {
                match reader.read(chunk_size).await {
                    Ok(Some(data)) => {
                        sent += data.len() as u64;
                        if tx.send(Ok(chunk_frame(data))).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(Status::from(e))).await;
                        return;
                    }
                }
            }

            let _ = tx.send(Ok(meta_frame(None, Some(sent)))).await;
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn delete(
        &self,
        request: Request<Resource>,
    ) -> Result<Response<ResourceOperationResponse>, Status> {
        let user = require_auth(&request)?;
        let res = request.into_inner();

        let id: ResourceId = res
            .id
            .ok_or_else(|| Status::invalid_argument("resource id is empty"))?
            .parse()
            .map_err(|_| Status::invalid_argument("resource id is malformed"))?;

        self.store.delete(user, id).await.map_err(Status::from)?;

        tracing::debug!(resource_id = %id, user_id = %user, "resource deleted");

        Ok(Response::new(ResourceOperationResponse {
            result: Some(resource_operation_response::Result::ErrorCode(0)),
        }))
    }
}
