//! End-to-end tests of the gRPC surface: an in-process server over the
//! in-memory backend, driven through real generated clients.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Server};
use tonic::{Code, Request};

use gophkeeper_core::proto::authorization_service_client::AuthorizationServiceClient;
use gophkeeper_core::proto::authorization_service_server::AuthorizationServiceServer;
use gophkeeper_core::proto::resource_operation_data::{Data, DataChunk, ResourceMeta};
use gophkeeper_core::proto::storage_client::StorageClient;
use gophkeeper_core::proto::storage_server::StorageServer;
use gophkeeper_core::proto::{
    resource_operation_response, AuthRequest, AuthResponse, ListRequest, Resource,
    ResourceOperationData,
};

use gophkeeper_server::auth::Authorizer;
use gophkeeper_server::grpc::{AuthLayer, AuthService, RateLimitLayer, RateLimiter, StorageService};
use gophkeeper_server::storage::memory::MemoryStorage;

const SEND_CHUNK_SIZE: usize = 8;

async fn start_server(rps_limit: u32) -> SocketAddr {
    let store = MemoryStorage::new();
    let authorizer =
        Arc::new(Authorizer::new(Arc::new(store.clone()), vec![0x5A; 64]).unwrap());

    let auth_service = AuthService::new(authorizer.clone());
    // A tiny send chunk size forces multi-chunk Get streams.
    let storage_service = StorageService::new(Arc::new(store), SEND_CHUNK_SIZE);

    let middleware = tower::ServiceBuilder::new()
        .layer(AuthLayer::new(authorizer))
        .layer(RateLimitLayer::new(Arc::new(RateLimiter::new(rps_limit))))
        .into_inner();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .layer(middleware)
            .add_service(AuthorizationServiceServer::new(auth_service))
            .add_service(StorageServer::new(storage_service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr) -> Channel {
    Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

async fn register(channel: Channel, login: &str, password: &str) -> AuthResponse {
    AuthorizationServiceClient::new(channel)
        .register(AuthRequest {
            login: Some(login.to_string()),
            password: Some(password.to_string()),
            salt: vec![0xAB; 64],
        })
        .await
        .unwrap()
        .into_inner()
}

fn with_token<T>(message: T, token: &str) -> Request<T> {
    let mut request = Request::new(message);
    let value: MetadataValue<_> = format!("jwt {token}").parse().unwrap();
    request.metadata_mut().insert("authorization", value);
    request
}

fn meta(salt: Option<Vec<u8>>, size: Option<u64>) -> ResourceOperationData {
    ResourceOperationData {
        data: Some(Data::Meta(ResourceMeta {
            salt,
            resource_byte_size: size,
        })),
    }
}

fn chunk(data: &[u8]) -> ResourceOperationData {
    ResourceOperationData {
        data: Some(Data::Chunk(DataChunk {
            data: data.to_vec(),
        })),
    }
}

async fn add_resource(channel: Channel, token: &str, salt: &[u8], data: &[u8]) -> String {
    let frames = vec![
        meta(Some(salt.to_vec()), Some(data.len() as u64)),
        chunk(data),
    ];

    let response = StorageClient::new(channel)
        .add(with_token(tokio_stream::iter(frames), token))
        .await
        .unwrap()
        .into_inner();

    match response.result.unwrap() {
        resource_operation_response::Result::Resource(resource) => resource.id.unwrap(),
        other => panic!("expected a resource, got {other:?}"),
    }
}

async fn list_ids(channel: Channel, token: &str) -> Vec<String> {
    let mut stream = StorageClient::new(channel)
        .list(with_token(ListRequest {}, token))
        .await
        .unwrap()
        .into_inner();

    let mut ids = Vec::new();
    while let Some(resource) = stream.message().await.unwrap() {
        ids.push(resource.id.unwrap());
    }
    ids
}

#[tokio::test]
async fn test_register_then_authorize() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let registered = register(channel.clone(), "t1", "t1").await;
    assert!(!registered.token.unwrap().is_empty());
    assert!(!registered.refresh_token.unwrap().is_empty());
    assert!(registered.user_id.is_some());

    let authorized = AuthorizationServiceClient::new(channel)
        .authorize(AuthRequest {
            login: Some("t1".to_string()),
            password: Some("t1".to_string()),
            salt: Vec::new(),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(authorized.user_id, registered.user_id);
    // Authorize returns the key salt chosen at registration.
    assert_eq!(authorized.salt, vec![0xAB; 64]);
}

#[tokio::test]
async fn test_authorize_wrong_password() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    register(channel.clone(), "t1", "t1").await;

    let err = AuthorizationServiceClient::new(channel)
        .authorize(AuthRequest {
            login: Some("t1".to_string()),
            password: Some("wrong".to_string()),
            salt: Vec::new(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::Unauthenticated);
    assert!(err.message().contains("invalid credentials"));
}

#[tokio::test]
async fn test_duplicate_registration() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    register(channel.clone(), "t1", "t1").await;

    let err = AuthorizationServiceClient::new(channel)
        .register(AuthRequest {
            login: Some("t1".to_string()),
            password: Some("other".to_string()),
            salt: vec![1; 64],
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn test_storage_requires_token() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let err = StorageClient::new(channel.clone())
        .list(ListRequest {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    let err = StorageClient::new(channel)
        .list(with_token(ListRequest {}, "garbage.token.here"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn test_add_get_roundtrip() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let payload = b"0123456789abcdefghij".to_vec();
    let salt = vec![0xCD; 64];
    let id = add_resource(channel.clone(), &token, &salt, &payload).await;

    let mut stream = StorageClient::new(channel)
        .get(with_token(
            Resource {
                id: Some(id),
                data: None,
                is_deleted: None,
            },
            &token,
        ))
        .await
        .unwrap()
        .into_inner();

    // First frame carries the blob salt, chunks follow, the byte count
    // arrives as a trailer.
    let first = stream.message().await.unwrap().unwrap();
    match first.data.unwrap() {
        Data::Meta(m) => {
            assert_eq!(m.salt.unwrap(), salt);
            assert!(m.resource_byte_size.is_none());
        }
        Data::Chunk(_) => panic!("data received before salt"),
    }

    let mut collected = Vec::new();
    let mut declared_size = None;
    while let Some(frame) = stream.message().await.unwrap() {
        match frame.data.unwrap() {
            Data::Chunk(c) => collected.extend_from_slice(&c.data),
            Data::Meta(m) => {
                declared_size = m.resource_byte_size;
                break;
            }
        }
    }

    assert_eq!(collected, payload);
    assert_eq!(declared_size, Some(payload.len() as u64));
    // The tiny send budget means the payload arrived in several chunks.
    assert!(payload.len() > SEND_CHUNK_SIZE);
}

#[tokio::test]
async fn test_add_first_frame_must_be_meta() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let frames = vec![chunk(b"data before meta")];
    let err = StorageClient::new(channel.clone())
        .add(with_token(tokio_stream::iter(frames), &token))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::FailedPrecondition);

    // No resource was created by the failed stream.
    assert!(list_ids(channel, &token).await.is_empty());
}

#[tokio::test]
async fn test_add_empty_stream_fails() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let err = StorageClient::new(channel)
        .add(with_token(
            tokio_stream::iter(Vec::<ResourceOperationData>::new()),
            &token,
        ))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::FailedPrecondition);
}

#[tokio::test]
async fn test_add_requires_declared_size() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let frames = vec![meta(Some(vec![1; 64]), None)];
    let err = StorageClient::new(channel)
        .add(with_token(tokio_stream::iter(frames), &token))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_add_size_bound_enforced() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let frames = vec![
        meta(Some(vec![1; 64]), Some(4)),
        chunk(b"way more than four bytes"),
    ];
    let err = StorageClient::new(channel.clone())
        .add(with_token(tokio_stream::iter(frames), &token))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::OutOfRange);

    // The aborted upload committed nothing.
    assert!(list_ids(channel, &token).await.is_empty());
}

#[tokio::test]
async fn test_add_duplicate_meta_rejected() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let frames = vec![
        meta(Some(vec![1; 64]), Some(10)),
        meta(Some(vec![2; 64]), Some(10)),
    ];
    let err = StorageClient::new(channel)
        .add(with_token(tokio_stream::iter(frames), &token))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::FailedPrecondition);
}

#[tokio::test]
async fn test_list_completeness() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();

    let mut uploaded = Vec::new();
    for i in 0..5u8 {
        let id = add_resource(channel.clone(), &token, &[i; 64], &[i; 16]).await;
        uploaded.push(id);
    }

    let mut listed = list_ids(channel, &token).await;
    uploaded.sort();
    listed.sort();
    assert_eq!(listed, uploaded);
}

#[tokio::test]
async fn test_delete_roundtrip() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token = register(channel.clone(), "t1", "t1").await.token.unwrap();
    let id = add_resource(channel.clone(), &token, &[1; 64], b"soon gone").await;

    let delete = |id: String, token: String, channel: Channel| async move {
        StorageClient::new(channel)
            .delete(with_token(
                Resource {
                    id: Some(id),
                    data: None,
                    is_deleted: None,
                },
                &token,
            ))
            .await
    };

    delete(id.clone(), token.clone(), channel.clone()).await.unwrap();
    assert!(list_ids(channel.clone(), &token).await.is_empty());

    // Idempotent: a second delete still succeeds.
    delete(id.clone(), token.clone(), channel.clone()).await.unwrap();

    // The soft-deleted resource is no longer readable.
    let err = StorageClient::new(channel)
        .get(with_token(
            Resource {
                id: Some(id),
                data: None,
                is_deleted: None,
            },
            &token,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn test_ownership_isolation() {
    let addr = start_server(1000).await;
    let channel = connect(addr).await;

    let token_a = register(channel.clone(), "alice", "pa").await.token.unwrap();
    let token_b = register(channel.clone(), "bob", "pb").await.token.unwrap();

    let id = add_resource(channel.clone(), &token_a, &[1; 64], b"alice's secret").await;

    // Bob's Get must fail exactly like a missing resource.
    let err = StorageClient::new(channel.clone())
        .get(with_token(
            Resource {
                id: Some(id.clone()),
                data: None,
                is_deleted: None,
            },
            &token_b,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    // Bob's Delete is as ineffective as deleting a missing resource.
    StorageClient::new(channel.clone())
        .delete(with_token(
            Resource {
                id: Some(id.clone()),
                data: None,
                is_deleted: None,
            },
            &token_b,
        ))
        .await
        .unwrap();

    assert_eq!(list_ids(channel.clone(), &token_a).await, vec![id]);
    assert!(list_ids(channel, &token_b).await.is_empty());
}

#[tokio::test]
async fn test_rate_limit_shared_across_calls() {
    let addr = start_server(2).await;
    let channel = connect(addr).await;

    let mut denied = 0;
    for _ in 0..10 {
        let result = AuthorizationServiceClient::new(channel.clone())
            .authorize(AuthRequest {
                login: Some("nobody".to_string()),
                password: Some("x".to_string()),
                salt: Vec::new(),
            })
            .await;

        if let Err(status) = result {
            if status.code() == Code::ResourceExhausted {
                denied += 1;
            }
        }
    }

    assert!(denied > 0, "token bucket never kicked in");
}
