//! The ledger the server talks to, chosen at start-up.

use std::sync::Arc;

use park_core::{Address, ObjectId};
use park_ledger::{
    EntryCall, EventCursor, EventPage, LedgerError, LedgerReader, LedgerWriter, RawObject,
    RpcLedgerClient, SimulatedLedger, TxReceipt, ViewCall,
};
use serde_json::Value;

/// A fullnode or the in-memory program.
///
/// The node client is read-only: signing is done by wallets, so writes
/// against it are reported as unsupported.
#[derive(Debug)]
pub enum LedgerBackend {
    /// In-memory program (development and demos).
    Simulated(Arc<SimulatedLedger>),
    /// JSON-RPC fullnode.
    Rpc(RpcLedgerClient),
}

impl LedgerBackend {
    /// Short name for logs and the health endpoint.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Simulated(_) => "simulated",
            Self::Rpc(_) => "rpc",
        }
    }
}

impl LedgerReader for LedgerBackend {
    async fn get_object(&self, id: &ObjectId) -> park_ledger::Result<Option<RawObject>> {
        match self {
            Self::Simulated(ledger) => ledger.get_object(id).await,
            Self::Rpc(client) => client.get_object(id).await,
        }
    }

    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventCursor>,
        limit: usize,
        descending: bool,
    ) -> park_ledger::Result<EventPage> {
        match self {
            Self::Simulated(ledger) => ledger.query_events(event_type, cursor, limit, descending).await,
            Self::Rpc(client) => client.query_events(event_type, cursor, limit, descending).await,
        }
    }

    async fn owned_objects(&self, owner: &Address, struct_type: &str) -> park_ledger::Result<Vec<RawObject>> {
        match self {
            Self::Simulated(ledger) => ledger.owned_objects(owner, struct_type).await,
            Self::Rpc(client) => client.owned_objects(owner, struct_type).await,
        }
    }

    async fn view_call(&self, call: &ViewCall) -> park_ledger::Result<Value> {
        match self {
            Self::Simulated(ledger) => ledger.view_call(call).await,
            Self::Rpc(client) => client.view_call(call).await,
        }
    }
}

impl LedgerWriter for LedgerBackend {
    async fn submit(&self, call: &EntryCall) -> park_ledger::Result<TxReceipt> {
        match self {
            Self::Simulated(ledger) => ledger.submit(call).await,
            Self::Rpc(_) => {
                let (_, name) = call.function.target();
                Err(LedgerError::unsupported(format!("{name} (sign and submit with a wallet)")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_ledger::{CallArg, EntryFunction, ProgramConfig, RpcConfig};

    #[tokio::test]
    async fn test_rpc_backend_refuses_writes() {
        let client = RpcLedgerClient::new(RpcConfig::default()).unwrap();
        let backend = LedgerBackend::Rpc(client);
        let call = EntryCall::new(
            EntryFunction::RegisterProfile,
            Address::parse("0xa").unwrap(),
            vec![CallArg::Bytes(Vec::new())],
        );
        let err = backend.submit(&call).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unsupported { .. }));
        assert_eq!(backend.kind(), "rpc");
    }

    #[tokio::test]
    async fn test_simulated_backend_delegates() {
        let program = ProgramConfig::new(ObjectId::parse("0x2a").unwrap());
        let backend = LedgerBackend::Simulated(Arc::new(SimulatedLedger::new(program)));
        let missing = ObjectId::parse("0x404").unwrap();
        assert!(backend.get_object(&missing).await.unwrap().is_none());
    }
}
