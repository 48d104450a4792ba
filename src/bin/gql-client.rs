use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "gql-client")]
#[command(about = "Send GraphQL operations to a gql-transport server", long_about = None)]
struct Cli {
    /// Server address, without scheme
    #[arg(short, long, default_value = "localhost:8000")]
    server: String,

    /// GraphQL path on the server
    #[arg(short, long, default_value = "/")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query or mutation over HTTP
    Query {
        document: String,
        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
        #[arg(long)]
        operation_name: Option<String>,
    },
    /// Run a subscription over graphql-ws and print every result
    Subscribe {
        document: String,
        #[arg(long)]
        variables: Option<String>,
        #[arg(long)]
        operation_name: Option<String>,
        /// connection_init payload as JSON
        #[arg(long)]
        init_payload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            document,
            variables,
            operation_name,
        } => {
            let envelope = envelope(document, variables, operation_name)?;
            let res = reqwest::Client::new()
                .post(format!("http://{}{}", cli.server, cli.path))
                .json(&envelope)
                .send()
                .await?;
            let status = res.status();
            let json: Value = res.json().await?;
            if !status.is_success() {
                eprintln!("Error: server returned status {}", status);
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Commands::Subscribe {
            document,
            variables,
            operation_name,
            init_payload,
        } => {
            let envelope = envelope(document, variables, operation_name)?;
            let init_payload = init_payload.map(|p| serde_json::from_str::<Value>(&p)).transpose()?;
            subscribe(&format!("ws://{}{}", cli.server, cli.path), envelope, init_payload).await?;
        }
    }

    Ok(())
}

fn envelope(
    document: String,
    variables: Option<String>,
    operation_name: Option<String>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut envelope = Map::new();
    envelope.insert("query".into(), Value::String(document));
    if let Some(variables) = variables {
        envelope.insert("variables".into(), serde_json::from_str(&variables)?);
    }
    if let Some(name) = operation_name {
        envelope.insert("operationName".into(), Value::String(name));
    }
    Ok(Value::Object(envelope))
}

async fn subscribe(
    url: &str,
    envelope: Value,
    init_payload: Option<Value>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("graphql-ws"));
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await?;

    let mut init = json!({"type": "connection_init"});
    if let Some(payload) = init_payload {
        init["payload"] = payload;
    }
    socket.send(Message::text(init.to_string())).await?;
    socket
        .send(Message::text(
            json!({"type": "start", "id": "1", "payload": envelope}).to_string(),
        ))
        .await?;

    while let Some(message) = socket.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let message: Value = serde_json::from_str(text.as_str())?;
        match message["type"].as_str() {
            Some("data") => println!("{}", serde_json::to_string_pretty(&message["payload"])?),
            Some("error") | Some("connection_error") => {
                eprintln!("Error: {}", message["payload"]);
                break;
            }
            Some("complete") => break,
            _ => {}
        }
    }

    let _ = socket
        .send(Message::text(json!({"type": "connection_terminate"}).to_string()))
        .await;
    Ok(())
}
