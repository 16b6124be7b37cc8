//! Per-connection request/response loop.
//!
//! A connection alternates strictly between reading one frame, passing
//! it through the authorization gate, waiting for the worker's answer
//! and writing one frame back; it never reads ahead, which is what
//! keeps responses ordered per connection. Idle connections are dropped
//! by a read timeout, protocol violations close without a response, and
//! an unauthorized connection closes right after its first response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::query::queue::QueryQueue;
use crate::query::{Query, QueryKind, QueryStatus};

use super::auth::{self, ApplicationType};

pub(crate) struct ConnectionContext {
    pub config: Arc<Config>,
    pub queue: QueryQueue,
    pub shutdown: watch::Receiver<bool>,
}

enum FrameOutcome {
    Payload(Vec<u8>),
    Closed,
}

pub(crate) async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut ctx: ConnectionContext,
) {
    // The listener is bound to loopback, so a remote peer here means a
    // misconfigured bind; refuse it before any byte reaches a handler.
    if !peer.ip().is_loopback() {
        error!("rejecting connection {peer}: remote address");
        return;
    }
    info!("connection {peer} assigned");

    let mut authorized = false;
    let mut application: Option<ApplicationType> = None;
    let mut world_id: i32 = 0;

    loop {
        let payload = match read_frame(&mut stream, &mut ctx).await {
            Ok(FrameOutcome::Payload(payload)) => payload,
            Ok(FrameOutcome::Closed) => break,
            Err(e) => {
                warn!("connection {peer}: read failed: {e}");
                break;
            }
        };

        let mut query = Query::new(payload, ctx.config.query_buffer_size);

        if authorized {
            let allowed = match (application, query.kind()) {
                (Some(application), Some(kind)) => auth::allowed(application, kind),
                _ => false,
            };
            if allowed {
                query.world_id = world_id;
                match run_query(&ctx, query).await {
                    Some(finished) => query = finished,
                    None => break,
                }
                if query.status == QueryStatus::Failed {
                    warn!(
                        "query ({}) {} from {peer} has FAILED",
                        query.kind_code(),
                        query.kind().map_or("UNKNOWN", QueryKind::name)
                    );
                }
            } else {
                error!(
                    "invalid query ({}) {} from {peer}",
                    query.kind_code(),
                    query.kind().map_or("UNKNOWN", QueryKind::name)
                );
                query.failed();
            }
        } else {
            match authorize(&ctx, peer, &mut query).await {
                GateOutcome::Authorized(app, world) => {
                    authorized = true;
                    application = Some(app);
                    world_id = world;
                }
                GateOutcome::Refused => {}
                GateOutcome::Close => break,
            }
        }

        if !write_response(&mut stream, peer, &query).await {
            break;
        }

        // An unauthorized connection gets exactly one response.
        if !authorized {
            break;
        }
    }

    info!("connection {peer} released");
}

enum GateOutcome {
    Authorized(ApplicationType, i32),
    /// Authorization failed but a FAILED response is owed first.
    Refused,
    /// Protocol violation; close without responding.
    Close,
}

/// First-request gate: only LOGIN is admitted, the shared password must
/// match, and a game world must resolve its world name through the
/// worker path before the connection is authorized.
async fn authorize(ctx: &ConnectionContext, peer: SocketAddr, query: &mut Query) -> GateOutcome {
    if query.kind() != Some(QueryKind::Login) {
        error!(
            "unauthorized query ({}) {} from {peer}",
            query.kind_code(),
            query.kind().map_or("UNKNOWN", QueryKind::name)
        );
        return GateOutcome::Close;
    }

    let mut request = query.request();
    let application_code = request.read_u8();
    let password = request.read_string(30);
    let world_name = if ApplicationType::from_code(application_code) == Some(ApplicationType::Game)
    {
        request.read_string(30)
    } else {
        String::new()
    };

    if password != ctx.config.query_manager_password {
        warn!("invalid login attempt from {peer}");
        query.failed();
        return GateOutcome::Refused;
    }

    match ApplicationType::from_code(application_code) {
        Some(ApplicationType::Game) => {
            if !query.rewrite_as_resolve_world(&world_name) {
                error!(
                    "rejecting connection {peer}: unable to rewrite login query; \
                     try increasing the query buffer size"
                );
                query.failed();
                return GateOutcome::Refused;
            }

            let resolved = match run_query_by_ref(ctx, query).await {
                Some(()) => query.status == QueryStatus::Ok && query.world_id > 0,
                None => return GateOutcome::Close,
            };

            if resolved {
                info!("connection {peer} authorized to game server \"{world_name}\"");
                let world_id = query.world_id;
                query.ok();
                GateOutcome::Authorized(ApplicationType::Game, world_id)
            } else {
                warn!("rejecting connection {peer}: unknown game server \"{world_name}\"");
                query.failed();
                GateOutcome::Refused
            }
        }
        Some(application @ (ApplicationType::Login | ApplicationType::Web)) => {
            info!("connection {peer} authorized to {}", application.name());
            query.ok();
            GateOutcome::Authorized(application, 0)
        }
        None => {
            warn!("rejecting connection {peer}: unknown application type {application_code}");
            query.failed();
            GateOutcome::Refused
        }
    }
}

/// Send the query through the worker queue and wait for its completion.
/// `None` means the workers are gone and the connection should close.
async fn run_query(ctx: &ConnectionContext, query: Query) -> Option<Query> {
    let completion = ctx.queue.enqueue(query).await.ok()?;
    completion.await.ok()
}

async fn run_query_by_ref(ctx: &ConnectionContext, query: &mut Query) -> Option<()> {
    let owned = std::mem::replace(query, Query::new(Vec::new(), 0));
    let finished = run_query(ctx, owned).await?;
    *query = finished;
    Some(())
}

/// Read one length-framed request. Enforces `0 < len <= buffer size`;
/// violations and EOF both close the connection.
async fn read_frame(
    stream: &mut TcpStream,
    ctx: &mut ConnectionContext,
) -> std::io::Result<FrameOutcome> {
    let idle = ctx.config.max_connection_idle_time();

    let mut short = [0u8; 2];
    match read_exact_guarded(stream, &mut short, idle, &mut ctx.shutdown).await? {
        ReadOutcome::Done => {}
        ReadOutcome::Closed => return Ok(FrameOutcome::Closed),
    }
    let short_length = u16::from_le_bytes(short);

    let length = if short_length == 0xFFFF {
        let mut extended = [0u8; 4];
        match read_exact_guarded(stream, &mut extended, idle, &mut ctx.shutdown).await? {
            ReadOutcome::Done => {}
            ReadOutcome::Closed => return Ok(FrameOutcome::Closed),
        }
        u32::from_le_bytes(extended) as usize
    } else {
        short_length as usize
    };

    if length == 0 || length > ctx.config.query_buffer_size {
        warn!("dropping connection: request length {length} out of bounds");
        return Ok(FrameOutcome::Closed);
    }

    let mut payload = vec![0u8; length];
    match read_exact_guarded(stream, &mut payload, idle, &mut ctx.shutdown).await? {
        ReadOutcome::Done => Ok(FrameOutcome::Payload(payload)),
        ReadOutcome::Closed => Ok(FrameOutcome::Closed),
    }
}

enum ReadOutcome {
    Done,
    Closed,
}

async fn read_exact_guarded(
    stream: &mut TcpStream,
    buffer: &mut [u8],
    idle: Option<Duration>,
    shutdown: &mut watch::Receiver<bool>,
) -> std::io::Result<ReadOutcome> {
    let read = async {
        match stream.read_exact(buffer).await {
            Ok(_) => Ok(ReadOutcome::Done),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(ReadOutcome::Closed),
            Err(e) => Err(e),
        }
    };

    let guarded = async {
        tokio::select! {
            result = read => result,
            _ = shutdown.changed() => Ok(ReadOutcome::Closed),
        }
    };

    match idle {
        Some(idle) => match tokio::time::timeout(idle, guarded).await {
            Ok(result) => result,
            Err(_) => {
                warn!("dropping connection due to inactivity");
                Ok(ReadOutcome::Closed)
            }
        },
        None => guarded.await,
    }
}

async fn write_response(stream: &mut TcpStream, peer: SocketAddr, query: &Query) -> bool {
    let Some(frame) = query.response_frame() else {
        error!("query buffer overflowed when writing to {peer}");
        return false;
    };
    if let Err(e) = stream.write_all(frame).await {
        warn!("connection {peer}: write failed: {e}");
        return false;
    }
    true
}
