//! Balance lookup against an in-process wallet provider.
//!
//! The provider answers `eth_getBalance` and pushes a `newHeads`
//! subscription notification after `eth_subscribe`; the client connects,
//! queries a balance and prints the notification it receives.
//!
//! Run with: `cargo run -p portrpc --example balance`

use std::sync::Arc;
use std::time::Duration;

use portrpc::channel::{Environment, PortWriter};
use portrpc::peer::{
    serve_with, subscription_notification, Incoming, NotificationListener, ProviderListener,
    Reply, Request, DATA_EVENT,
};
use portrpc::{connect_with_config, CorrelatorConfig};
use serde_json::{json, Value};

fn wallet(call: Incoming<'_>, writer: &PortWriter) -> Reply {
    match call.method {
        "eth_getBalance" => Reply::Result(json!("0")),
        "eth_subscribe" => {
            let head = subscription_notification("eth", "0xheads", json!({"number": "0x1b4"}));
            if let Err(err) = writer.write(head) {
                eprintln!("provider: failed to push notification: {err}");
            }
            Reply::Result(json!("0xheads"))
        }
        other => Reply::Error {
            code: -32601,
            message: format!("method not found: {other}"),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = Environment::new("https://dapp.example");

    let mut listener = ProviderListener::bind(&env);
    tokio::spawn(async move {
        match listener.accept().await {
            Ok(port) => {
                let answered = serve_with(port, wallet).await;
                println!("provider: answered {answered} requests");
            }
            Err(err) => eprintln!("provider: accept failed: {err}"),
        }
    });

    let config = CorrelatorConfig::default().with_request_timeout(Duration::from_secs(2));
    let client = connect_with_config(&env, config);
    client.ready().await?;
    println!("client: {}", client.state().as_str());

    let (heads_tx, mut heads) = tokio::sync::mpsc::unbounded_channel();
    let on_head: NotificationListener = Arc::new(move |message: &Value| {
        let _ = heads_tx.send(message.clone());
    });
    client.on(DATA_EVENT, on_head.clone());

    let balance = client
        .request(&Request::new(
            "a",
            "eth_getBalance",
            json!(["0xc0ffee254729296a45a3885639AC7E10F9d54979", "latest"]),
        ))
        .await?;
    println!("client: balance response {balance}");

    let subscription = client
        .request(&Request::new("b", "eth_subscribe", json!(["newHeads"])))
        .await?;
    println!("client: subscribed {}", subscription["result"]);

    if let Some(head) = heads.recv().await {
        println!("client: new head {}", head["params"]["result"]);
    }
    client.remove_listener(DATA_EVENT, &on_head);

    Ok(())
}
