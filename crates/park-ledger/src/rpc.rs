//! JSON-RPC client for a ledger fullnode.
//!
//! Read-only: objects, events, owned-object listings and view calls, the
//! latter through transaction inspection (see [`crate::inspect`]). Signing
//! lives outside this crate, so the client does not implement
//! [`crate::LedgerWriter`].

use std::sync::atomic::{AtomicU64, Ordering};

use park_core::{Address, ObjectId};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::client::LedgerReader;
use crate::config::{ProgramConfig, RpcConfig};
use crate::decode::value_as_u64;
use crate::error::{LedgerError, Result};
use crate::inspect::{self, Input, ObjectInput};
use crate::raw::{CallArg, EventCursor, EventPage, RawEvent, RawObject, ViewCall};

/// Objects requested per owned-object page.
const OWNED_PAGE_LIMIT: usize = 50;

/// Upper bound on owned-object pages for one listing.
const MAX_OWNED_PAGES: usize = 20;

/// Fullnode JSON-RPC client.
#[derive(Debug)]
pub struct RpcLedgerClient {
    http: reqwest::Client,
    config: RpcConfig,
    program: Option<ProgramConfig>,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::transient("client setup", e.to_string()))?;
        Ok(Self {
            http,
            config,
            program: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Enables view calls against the program at `program`.
    #[must_use]
    pub fn with_program(mut self, program: ProgramConfig) -> Self {
        self.program = Some(program);
        self
    }

    /// The node URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc call");

        let response = self
            .http
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.transport_error(method, &e))?;
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| self.transport_error(method, &e))?;
        parse_envelope(method, envelope)
    }

    async fn view_input(&self, arg: &CallArg) -> Result<Input> {
        let CallArg::Object(id) = arg else {
            return Input::pure(arg);
        };
        let result = self
            .call("sui_getObject", json!([id.as_str(), { "showOwner": true }]))
            .await?;
        match result.get("data") {
            Some(data) => Ok(Input::Object(ObjectInput::from_object_data(id, data)?)),
            None => Err(LedgerError::not_found(id.as_str())),
        }
    }

    fn transport_error(&self, method: &str, err: &reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout {
                operation: method.to_string(),
                timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            LedgerError::transient(method, err.to_string())
        }
    }
}

fn object_options() -> Value {
    json!({ "showType": true, "showContent": true, "showOwner": true })
}

impl LedgerReader for RpcLedgerClient {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<RawObject>> {
        let result = self
            .call("sui_getObject", json!([id.as_str(), object_options()]))
            .await?;
        parse_object_response(&result)
    }

    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventCursor>,
        limit: usize,
        descending: bool,
    ) -> Result<EventPage> {
        let cursor = cursor.map(serde_json::to_value).transpose()?;
        let result = self
            .call(
                "suix_queryEvents",
                json!([{ "MoveEventType": event_type }, cursor, limit, descending]),
            )
            .await?;
        parse_event_page(&result)
    }

    async fn owned_objects(&self, owner: &Address, struct_type: &str) -> Result<Vec<RawObject>> {
        let query = json!({
            "filter": { "StructType": struct_type },
            "options": object_options(),
        });
        let mut objects = Vec::new();
        let mut cursor = Value::Null;

        for _ in 0..MAX_OWNED_PAGES {
            let result = self
                .call(
                    "suix_getOwnedObjects",
                    json!([owner.as_str(), query, cursor, OWNED_PAGE_LIMIT]),
                )
                .await?;
            let (page, next) = parse_owned_page(&result)?;
            objects.extend(page);
            match next {
                Some(next) => cursor = next,
                None => return Ok(objects),
            }
        }

        warn!(owner = %owner, struct_type, pages = MAX_OWNED_PAGES, "owned object listing truncated");
        Ok(objects)
    }

    async fn view_call(&self, call: &ViewCall) -> Result<Value> {
        let Some(program) = &self.program else {
            return Err(LedgerError::unsupported(format!(
                "view call {:?} without a program",
                call.function
            )));
        };
        let mut inputs = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            inputs.push(self.view_input(arg).await?);
        }
        let tx = inspect::encode_view_call(program, call, &inputs)?;
        let result = self
            .call(
                "sui_devInspectTransactionBlock",
                json!([inspect::INSPECT_SENDER, tx]),
            )
            .await?;
        inspect::parse_return_value(&result)
            .inspect_err(|e| debug!(function = ?call.function, error = %e, "view call failed"))
    }
}

fn parse_envelope(method: &str, mut envelope: Value) -> Result<Value> {
    if let Some(err) = envelope.get("error") {
        return Err(LedgerError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match envelope.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(LedgerError::transient(method, "response has neither result nor error")),
    }
}

fn parse_object_response(result: &Value) -> Result<Option<RawObject>> {
    if let Some(err) = result.get("error") {
        let code = err.get("code").and_then(Value::as_str).unwrap_or_default();
        return match code {
            "notExists" | "deleted" | "dynamicFieldNotFound" => Ok(None),
            _ => Err(LedgerError::Rpc {
                code: -1,
                message: err.to_string(),
            }),
        };
    }
    result.get("data").map(parse_object_data).transpose()
}

fn parse_object_data(data: &Value) -> Result<RawObject> {
    let object_id = data
        .get("objectId")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::Decode {
            kind: "object",
            id: String::new(),
            message: "missing objectId".to_string(),
        })?
        .to_string();
    let content = data.get("content");
    let type_tag = data
        .get("type")
        .or_else(|| content.and_then(|c| c.get("type")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let owner = data.get("owner").and_then(|o| {
        o.get("AddressOwner")
            .or_else(|| o.get("ObjectOwner"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    Ok(RawObject {
        version: data.get("version").and_then(value_as_u64).unwrap_or(0),
        fields: content
            .and_then(|c| c.get("fields"))
            .cloned()
            .unwrap_or(Value::Null),
        object_id,
        type_tag,
        owner,
    })
}

fn parse_event_page(result: &Value) -> Result<EventPage> {
    let data = result
        .get("data")
        .and_then(Value::as_array)
        .map(|events| events.iter().map(parse_event).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    let next_cursor = match result.get("nextCursor") {
        None | Some(Value::Null) => None,
        Some(cursor) => Some(serde_json::from_value(cursor.clone())?),
    };
    Ok(EventPage {
        data,
        next_cursor,
        has_next_page: result
            .get("hasNextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_event(event: &Value) -> Result<RawEvent> {
    let id = event.get("id").cloned().unwrap_or(Value::Null);
    Ok(RawEvent {
        id: serde_json::from_value(id)?,
        event_type: event
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        sender: event.get("sender").and_then(Value::as_str).map(str::to_string),
        timestamp_ms: event.get("timestampMs").and_then(value_as_u64),
        parsed: event.get("parsedJson").cloned().unwrap_or(Value::Null),
    })
}

fn parse_owned_page(result: &Value) -> Result<(Vec<RawObject>, Option<Value>)> {
    let mut objects = Vec::new();
    for entry in result.get("data").and_then(Value::as_array).into_iter().flatten() {
        if let Some(object) = parse_object_response(entry)? {
            objects.push(object);
        }
    }
    let has_next = result
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let next = result
        .get("nextCursor")
        .filter(|c| has_next && !c.is_null())
        .cloned();
    Ok((objects, next))
}
