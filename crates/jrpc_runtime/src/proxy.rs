//! Method-Table-Driven Proxy Surface (§4.8): maps a declared call
//! signature to the wire method name and return shape needed to invoke
//! it through a [`Client`], without any source-language code generation.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::catalog::ReturnShape;
use crate::client::Client;
use crate::error::ClientError;

/// One row of the proxy table: what a declared signature actually calls.
#[derive(Clone, Debug)]
pub struct ProxyEntry {
    pub method: String,
    pub return_shape: ReturnShape,
}

/// The table itself. Built once at host/client setup from the same
/// method metadata the catalog uses, then consulted on every call.
#[derive(Default)]
pub struct ProxyTable {
    entries: HashMap<String, ProxyEntry>,
}

impl ProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declared signature identity (e.g. `"add(int,int)"`)
    /// against the wire method it invokes.
    pub fn register(&mut self, signature: impl Into<String>, method: impl Into<String>, return_shape: ReturnShape) -> &mut Self {
        self.entries.insert(
            signature.into(),
            ProxyEntry {
                method: method.into(),
                return_shape,
            },
        );
        self
    }

    pub fn resolve(&self, signature: &str) -> Option<&ProxyEntry> {
        self.entries.get(signature)
    }

    /// Packs `args` positionally and issues the call the table maps
    /// `signature` to. A void return shape becomes a notification and
    /// resolves to `Value::Null`; every other shape becomes a request.
    /// An unresolved signature is a [`ClientError::NotSupported`].
    pub async fn call(
        &self,
        client: &Client,
        signature: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let entry = self.resolve(signature).ok_or(ClientError::NotSupported)?.clone();
        let params = Some(Value::Array(args));

        match entry.return_shape {
            ReturnShape::Void => {
                client.send_notification(entry.method, params).await?;
                Ok(Value::Null)
            }
            ReturnShape::Sync | ReturnShape::Async => client.send_request(entry.method, params, timeout).await,
        }
    }

    /// Blocks the calling thread for a synchronous-shaped signature,
    /// the way [`crate::pipeline::SyncNext`] blocks a pipeline worker on
    /// the server side: via `block_in_place` plus a nested `block_on`.
    pub fn call_blocking(
        &self,
        client: &Client,
        signature: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.call(client, signature, args, timeout))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientOptions;
    use crate::framing::{FramedReader, FramedWriter};
    use crate::message::{Message, Response};
    use serde_json::json;

    #[tokio::test]
    async fn resolved_signature_round_trips_through_the_client() {
        let (client_side, peer_side) = tokio::io::duplex(8192);
        let (client_read, client_write) = tokio::io::split(client_side);
        let client = Client::connect(client_read, client_write, ClientOptions::default());

        let mut table = ProxyTable::new();
        table.register("add(int,int)", "add", ReturnShape::Sync);

        let (peer_read, peer_write) = tokio::io::split(peer_side);
        let mut peer_reader = FramedReader::new(peer_read);
        let peer_writer = FramedWriter::new(peer_write);

        let call = tokio::spawn(async move { table.call(&client, "add(int,int)", vec![json!(1), json!(2)], None).await });

        let request = peer_reader.read().await.unwrap();
        let id = match request {
            Message::Request(r) => {
                assert_eq!(r.method, "add");
                r.id
            }
            other => panic!("expected request, got {other:?}"),
        };
        peer_writer.write(&Message::Response(Response::ok(id, json!(3)))).await.unwrap();

        assert_eq!(call.await.unwrap().unwrap(), json!(3));
    }

    #[tokio::test]
    async fn void_return_shape_sends_a_notification_and_yields_null() {
        let (client_side, peer_side) = tokio::io::duplex(8192);
        let (client_read, client_write) = tokio::io::split(client_side);
        let client = Client::connect(client_read, client_write, ClientOptions::default());

        let mut table = ProxyTable::new();
        table.register("log(str)", "log", ReturnShape::Void);

        let (peer_read, _peer_write) = tokio::io::split(peer_side);
        let mut peer_reader = FramedReader::new(peer_read);

        let result = table.call(&client, "log(str)", vec![json!("hi")], None).await.unwrap();
        assert_eq!(result, Value::Null);

        let received = peer_reader.read().await.unwrap();
        assert!(matches!(received, Message::Notification(_)));
    }

    #[tokio::test]
    async fn unresolved_signature_is_not_supported() {
        let (client_side, _peer_side) = tokio::io::duplex(8192);
        let (client_read, client_write) = tokio::io::split(client_side);
        let client = Client::connect(client_read, client_write, ClientOptions::default());

        let table = ProxyTable::new();
        let err = table.call(&client, "missing()", vec![], None).await.unwrap_err();
        assert!(matches!(err, ClientError::NotSupported));
    }
}
