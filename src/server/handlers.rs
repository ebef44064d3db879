use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{AppError, RpcError, RpcResult, StorageError, TurnError};
use crate::turns::{PublicTurn, TurnInput, TurnResult};

/// Default page size for `turn/list`.
const DEFAULT_LIST_LIMIT: u32 = 20;

/// Outcome of a routed call.
#[derive(Debug)]
pub enum Dispatch {
    /// Reply with this value.
    Reply(Value),
    /// A turn was created; reply with its ids and run it in the background.
    Turn(TurnResult),
}

#[derive(Debug, Deserialize)]
struct AskParams {
    requester: String,
    question: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowUpParams {
    requester: String,
    thread_id: String,
    question: String,
}

#[derive(Debug, Deserialize)]
struct WriteCodeParams {
    requester: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct TurnIdParams {
    turn_id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadIdParams {
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    requester: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// Reply to a turn-starting call.
#[derive(Debug, Serialize)]
pub struct TurnStarted {
    /// New turn id.
    pub turn_id: String,
    /// Thread the turn joined.
    pub thread_id: String,
}

/// Reply to `thread/get`.
#[derive(Debug, Serialize)]
pub struct ThreadView {
    /// Root turn id.
    pub thread_id: String,
    /// Turns in creation order.
    pub turns: Vec<PublicTurn>,
}

/// Route a method call to its handler
pub async fn handle_call(
    state: &SharedState,
    method: &str,
    params: Option<Value>,
) -> RpcResult<Dispatch> {
    info!(method = %method, "Routing call");

    match method {
        "turn/ask" => {
            let p: AskParams = parse_params(method, params)?;
            let input = match p.code {
                Some(code) => TurnInput::question(p.question).with_code(code),
                None => TurnInput::question(p.question),
            };
            start_turn(state, method, &p.requester, input).await
        }
        "turn/follow_up" => {
            let p: FollowUpParams = parse_params(method, params)?;
            let input = TurnInput::follow_up(p.thread_id, p.question);
            start_turn(state, method, &p.requester, input).await
        }
        "turn/write_code" => {
            let p: WriteCodeParams = parse_params(method, params)?;
            start_turn(state, method, &p.requester, TurnInput::write_code(p.description)).await
        }
        "turn/get" => {
            let p: TurnIdParams = parse_params(method, params)?;
            let turn = state
                .storage
                .load_turn(&p.turn_id)
                .await
                .map_err(|e| call_error(method, e.into()))?
                .ok_or_else(|| {
                    call_error(
                        method,
                        StorageError::TurnNotFound {
                            turn_id: p.turn_id.clone(),
                        }
                        .into(),
                    )
                })?;
            reply(turn.public())
        }
        "turn/list" => {
            let p: ListParams = parse_params(method, params)?;
            let turns = state
                .storage
                .list_requester_turns(&p.requester, p.limit.unwrap_or(DEFAULT_LIST_LIMIT))
                .await
                .map_err(|e| call_error(method, e.into()))?;
            let turns: Vec<PublicTurn> = turns.iter().map(TurnResult::public).collect();
            reply(serde_json::json!({ "turns": turns }))
        }
        "thread/get" => {
            let p: ThreadIdParams = parse_params(method, params)?;
            let turns = state
                .storage
                .thread_turns(&p.thread_id)
                .await
                .map_err(|e| call_error(method, e.into()))?;
            if turns.is_empty() {
                return Err(call_error(
                    method,
                    TurnError::ThreadNotFound {
                        thread_id: p.thread_id,
                    }
                    .into(),
                ));
            }
            reply(ThreadView {
                thread_id: p.thread_id,
                turns: turns.iter().map(TurnResult::public).collect(),
            })
        }
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

async fn start_turn(
    state: &SharedState,
    method: &str,
    requester: &str,
    input: TurnInput,
) -> RpcResult<Dispatch> {
    let turn = state
        .controller
        .start_turn(requester, input)
        .await
        .map_err(|e| call_error(method, e))?;
    Ok(Dispatch::Turn(turn))
}

fn reply<T: Serialize>(value: T) -> RpcResult<Dispatch> {
    Ok(Dispatch::Reply(serde_json::to_value(value)?))
}

/// Caller mistakes become invalid-parameter errors; the rest are execution failures.
fn call_error(method: &str, err: AppError) -> RpcError {
    match err {
        AppError::Turn(TurnError::Validation { .. } | TurnError::ThreadNotFound { .. })
        | AppError::Storage(StorageError::TurnNotFound { .. }) => RpcError::InvalidParameters {
            method: method.to_string(),
            message: err.to_string(),
        },
        other => other.into(),
    }
}

/// Parse params into a typed struct
fn parse_params<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> RpcResult<T> {
    match params {
        Some(params) => serde_json::from_value(params).map_err(|e| RpcError::InvalidParameters {
            method: method.to_string(),
            message: e.to_string(),
        }),
        None => Err(RpcError::InvalidParameters {
            method: method.to_string(),
            message: "Missing params".to_string(),
        }),
    }
}
