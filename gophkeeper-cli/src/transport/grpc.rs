use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};
use tonic::{Request, Response, Status, Streaming};

use gophkeeper_core::proto::authorization_service_client::AuthorizationServiceClient;
use gophkeeper_core::proto::resource_operation_data::{Data, DataChunk, ResourceMeta};
use gophkeeper_core::proto::storage_client::StorageClient;
use gophkeeper_core::proto::{
    resource_operation_response, AuthRequest, Resource, ResourceOperationData,
    ResourceOperationResponse,
};

use super::UserAuthorization;
use crate::config::ServerEndpoint;
use crate::error::{ClientError, Result};

/// Maximum message size accepted and produced by the client (matches the
/// server's receive ceiling).
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// gRPC client for the authorization and storage services.
#[derive(Clone)]
pub struct GrpcClient {
    auth: AuthorizationServiceClient<Channel>,
    storage: StorageClient<Channel>,
}

impl GrpcClient {
    pub async fn connect(endpoint: &ServerEndpoint) -> Result<Self> {
        let scheme = if endpoint.use_tls { "https" } else { "http" };
        let uri = format!("{scheme}://{}:{}", endpoint.address, endpoint.port);

        let mut channel = Channel::from_shared(uri)
            .map_err(|e| ClientError::Transport(format!("bad server endpoint: {e}")))?;

        if endpoint.use_tls {
            let mut tls = ClientTlsConfig::new().domain_name(endpoint.address.clone());
            if let Some(ca_path) = &endpoint.ca_path {
                let pem = tokio::fs::read(ca_path).await?;
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            channel = channel
                .tls_config(tls)
                .map_err(|e| ClientError::Transport(format!("bad TLS config: {e}")))?;
        }

        let channel = channel
            .connect()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to connect: {e}")))?;

        Ok(Self {
            auth: AuthorizationServiceClient::new(channel.clone())
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
            storage: StorageClient::new(channel)
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
        })
    }

    pub async fn register(
        &self,
        login: &str,
        password: &str,
        salt: &[u8],
    ) -> Result<UserAuthorization> {
        let response = self
            .auth
            .clone()
            .register(AuthRequest {
                login: Some(login.to_string()),
                password: Some(password.to_string()),
                salt: salt.to_vec(),
            })
            .await?
            .into_inner();

        Ok(UserAuthorization {
            user_id: response.user_id.unwrap_or_default(),
            token: response.token.unwrap_or_default(),
            refresh_token: response.refresh_token.unwrap_or_default(),
            salt: salt.to_vec(),
        })
    }

    pub async fn authorize(&self, login: &str, password: &str) -> Result<UserAuthorization> {
        let response = self
            .auth
            .clone()
            .authorize(AuthRequest {
                login: Some(login.to_string()),
                password: Some(password.to_string()),
                salt: Vec::new(),
            })
            .await?
            .into_inner();

        Ok(UserAuthorization {
            user_id: response.user_id.unwrap_or_default(),
            token: response.token.unwrap_or_default(),
            refresh_token: response.refresh_token.unwrap_or_default(),
            salt: response.salt,
        })
    }

    /// Open an Add stream. The meta frame with the blob salt and the declared
    /// byte size is sent before this returns.
    pub async fn store(
        &self,
        auth: &UserAuthorization,
        salt: Vec<u8>,
        byte_size: u64,
    ) -> Result<ResourceUpload> {
        let (tx, rx) = mpsc::channel::<ResourceOperationData>(4);
        let request = with_auth(ReceiverStream::new(rx), &auth.token)?;

        let mut storage = self.storage.clone();
        let response = tokio::spawn(async move { storage.add(request).await });

        let meta = ResourceOperationData {
            data: Some(Data::Meta(ResourceMeta {
                salt: Some(salt),
                resource_byte_size: Some(byte_size),
            })),
        };
        if tx.send(meta).await.is_err() {
            // The server already tore the stream down; surface its status.
            let joined = response
                .await
                .map_err(|e| ClientError::Transport(format!("upload task failed: {e}")))?;
            return match joined {
                Ok(_) => Err(ClientError::Protocol(
                    "upload stream closed before meta was sent".to_string(),
                )),
                Err(status) => Err(status.into()),
            };
        }

        Ok(ResourceUpload { tx, response })
    }

    /// Fetch the caller's resource listing, applying `operation_timeout` to
    /// every stream receive.
    pub async fn list(
        &self,
        auth: &UserAuthorization,
        operation_timeout: Duration,
    ) -> Result<Vec<String>> {
        let request = with_auth(gophkeeper_core::proto::ListRequest {}, &auth.token)?;
        let mut stream = self.storage.clone().list(request).await?.into_inner();

        let mut ids = Vec::new();
        loop {
            let message = tokio::time::timeout(operation_timeout, stream.message())
                .await
                .map_err(|_| ClientError::DeadlineExceeded)??;

            match message {
                Some(resource) => {
                    if let Some(id) = resource.id {
                        ids.push(id);
                    }
                }
                None => break,
            }
        }

        Ok(ids)
    }

    /// Open a Get stream for one resource.
    pub async fn get(
        &self,
        auth: &UserAuthorization,
        resource_id: &str,
        operation_timeout: Duration,
    ) -> Result<ResourceDownload> {
        let request = with_auth(
            Resource {
                id: Some(resource_id.to_string()),
                data: None,
                is_deleted: None,
            },
            &auth.token,
        )?;

        let stream = self.storage.clone().get(request).await?.into_inner();

        Ok(ResourceDownload {
            stream,
            operation_timeout,
        })
    }

    pub async fn delete(&self, auth: &UserAuthorization, resource_id: &str) -> Result<()> {
        let request = with_auth(
            Resource {
                id: Some(resource_id.to_string()),
                data: None,
                is_deleted: None,
            },
            &auth.token,
        )?;

        let response = self.storage.clone().delete(request).await?.into_inner();
        check_operation_response(response).map(|_| ())
    }
}

fn with_auth<T>(message: T, token: &str) -> Result<Request<T>> {
    let mut request = Request::new(message);
    let value: MetadataValue<_> = format!("jwt {token}")
        .parse()
        .map_err(|_| ClientError::Protocol("token is not valid metadata".to_string()))?;
    request.metadata_mut().insert("authorization", value);
    Ok(request)
}

fn check_operation_response(response: ResourceOperationResponse) -> Result<Option<String>> {
    match response.result {
        Some(resource_operation_response::Result::Resource(resource)) => Ok(resource.id),
        Some(resource_operation_response::Result::ErrorCode(0)) => Ok(None),
        Some(resource_operation_response::Result::ErrorCode(code)) => Err(ClientError::Protocol(
            format!("got an error from the server: {code}"),
        )),
        None => Err(ClientError::Protocol("empty operation response".to_string())),
    }
}

/// Client half of an Add stream: send chunks, then half-close and collect the
/// assigned resource id.
pub struct ResourceUpload {
    tx: mpsc::Sender<ResourceOperationData>,
    response: JoinHandle<std::result::Result<Response<ResourceOperationResponse>, Status>>,
}

impl ResourceUpload {
    /// Send one data chunk. An error means the server closed the stream
    /// early; call `finish` to learn why.
    pub async fn send_chunk(&self, data: Vec<u8>) -> std::result::Result<(), ()> {
        let frame = ResourceOperationData {
            data: Some(Data::Chunk(DataChunk { data })),
        };
        self.tx.send(frame).await.map_err(|_| ())
    }

    /// Half-close the stream and return the id the server assigned.
    pub async fn finish(self) -> Result<String> {
        drop(self.tx);

        let response = self
            .response
            .await
            .map_err(|e| ClientError::Transport(format!("upload task failed: {e}")))??
            .into_inner();

        check_operation_response(response)?
            .ok_or_else(|| ClientError::Protocol("server did not return a resource id".to_string()))
    }
}

/// One frame of a Get stream, flattened for the downloader.
#[derive(Debug, Default)]
pub struct ResourceFrame {
    pub salt: Option<Vec<u8>>,
    pub size: Option<u64>,
    pub data: Vec<u8>,
}

/// Client half of a Get stream with a per-receive deadline.
pub struct ResourceDownload {
    stream: Streaming<ResourceOperationData>,
    operation_timeout: Duration,
}

impl ResourceDownload {
    pub async fn recv(&mut self) -> Result<Option<ResourceFrame>> {
        let message = tokio::time::timeout(self.operation_timeout, self.stream.message())
            .await
            .map_err(|_| ClientError::DeadlineExceeded)??;

        let Some(frame) = message else {
            return Ok(None);
        };

        let mut result = ResourceFrame::default();
        match frame.data {
            Some(Data::Meta(meta)) => {
                result.salt = meta.salt;
                result.size = meta.resource_byte_size;
            }
            Some(Data::Chunk(chunk)) => result.data = chunk.data,
            None => {}
        }

        Ok(Some(result))
    }
}
