//! Create a thing, list it, delete it, then close the connector.
//!
//! Each step is scheduled from the previous step's callback; the whole chain
//! runs on one current-thread runtime driven by `Connector::run`.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use serde_json::{json, Value};
use things_core::{ClientConfig, ClientError, Connector, Reply};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BASE_URL: &str = "https://things.apps.bosch-iot-cloud.com/api/1";

#[derive(Parser, Debug)]
#[command(name = "things-demo")]
#[command(about = "Create, list and delete a thing through the Things REST API", long_about = None)]
struct Cli {
    /// Base URL of the REST API, without the `/things` suffix
    #[arg(long, env = "THINGS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "THINGS_USERNAME", required_unless_present = "config")]
    username: Option<String>,

    #[arg(long, env = "THINGS_PASSWORD", hide_env_values = true, required_unless_present = "config")]
    password: Option<String>,

    #[arg(long, env = "THINGS_API_TOKEN", hide_env_values = true, required_unless_present = "config")]
    api_token: Option<String>,

    /// TOML file with base_url, username, password and api_token
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig, Box<dyn std::error::Error>> {
        if let Some(path) = &self.config {
            return load_config(path);
        }
        Ok(ClientConfig::new(
            self.base_url.as_str(),
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
            self.api_token.clone().unwrap_or_default(),
        ))
    }
}

fn load_config(path: &Path) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let raw: ClientConfig = toml::from_str(&text)?;
    Ok(ClientConfig::new(raw.base_url, raw.username, raw.password, raw.api_token))
}

fn sample_thing() -> Value {
    json!({
        "attributes": {
            "dimensions": {
                "width": 123,
                "height": 321
            }
        },
        "features": {
            "dimensions": {
                "scalable": true
            }
        }
    })
}

/// Stdout block for one processed request.
fn render_reply(title: &str, reply: &Reply) -> String {
    let mut out = format!("Request processed: \t {title}\n");
    out.push_str(&format!("HTTP status code: \t {}\n", reply.status));
    if let Some(id) = reply.thing_id() {
        out.push_str(&format!("Thing ID: \t\t {id}\n"));
    }
    out.push_str(&format!("Elapsed: \t\t {} ms\n", reply.elapsed.as_millis()));
    out.push_str(&format!("Content: \t{}\n", reply.pretty_body()));
    out
}

/// Stderr block for a failed request, `None` when the reply is fine.
fn render_errors(reply: &Reply) -> Option<String> {
    if !reply.is_error() {
        return None;
    }
    let mut out = String::new();
    if let Some(e) = &reply.transport_error {
        out.push_str(&format!("  transport: {e}\n"));
    }
    for (key, value) in reply.error_fields() {
        out.push_str(&format!("  {key}: {value}\n"));
    }
    Some(out)
}

/// Shared by the callbacks of one chain; set when any step failed.
#[derive(Clone, Default)]
struct Failed(Rc<Cell<bool>>);

impl Failed {
    fn report(&self, title: &str, reply: &Reply) {
        println!("{}", render_reply(title, reply));
        if let Some(errors) = render_errors(reply) {
            eprintln!("\n{errors}");
            self.mark();
        }
    }

    /// A step could not be scheduled: record it and end the chain.
    fn abort(&self, connector: &Connector, step: &str, e: ClientError) {
        error!(step, error = %e, "could not schedule request");
        self.mark();
        connector.close();
    }

    fn mark(&self) {
        self.0.set(true);
    }

    fn get(&self) -> bool {
        self.0.get()
    }
}

/// Id of the thing a create reply announced. Only successful replies count.
fn created_thing_id(reply: &Reply) -> Option<String> {
    if !reply.is_success() {
        return None;
    }
    reply.thing_id().map(str::to_string)
}

fn create_step(connector: &mut Connector, failed: Failed) -> Result<(), ClientError> {
    connector.create_thing(&sample_thing(), move |c, reply| {
        failed.report("create a new thing", &reply);
        let Some(id) = created_thing_id(&reply) else {
            warn!(status = reply.status, "no thing was created, skipping list and delete");
            failed.mark();
            c.close();
            return;
        };
        if let Err(e) = list_step(c, id, failed.clone()) {
            failed.abort(c, "list", e);
        }
    })?;
    Ok(())
}

fn list_step(connector: &mut Connector, id: String, failed: Failed) -> Result<(), ClientError> {
    let ids = [id.clone()];
    connector.list_things(&ids, move |c, reply| {
        failed.report("list all available things", &reply);
        if let Err(e) = delete_step(c, &id, failed.clone()) {
            failed.abort(c, "delete", e);
        }
    })?;
    Ok(())
}

fn delete_step(connector: &mut Connector, id: &str, failed: Failed) -> Result<(), ClientError> {
    connector.delete_thing(id, move |c, reply| {
        failed.report("delete thing", &reply);
        c.close();
    })?;
    Ok(())
}

/// Run the chain to completion. Returns `true` when any step failed.
async fn run(config: ClientConfig) -> Result<bool, ClientError> {
    let mut connector = Connector::new(config)?;
    let finished = connector.finished();
    let failed = Failed::default();

    create_step(&mut connector, failed.clone())?;
    connector.run().await;
    drop(connector);

    if !finished.wait().await {
        warn!("request chain ended without closing the connector");
        return Ok(true);
    }
    Ok(failed.get())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "things_core=info,things_demo=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    if runtime.block_on(run(config))? {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_config_and_strip_slash() {
        let cli = Cli::try_parse_from([
            "things-demo",
            "--base-url",
            "http://localhost:3000/api/1/",
            "--username",
            "alice",
            "--password",
            "pw",
            "--api-token",
            "tok",
        ])
        .unwrap();
        let config = cli.client_config().unwrap();
        assert_eq!(config, ClientConfig::new("http://localhost:3000/api/1", "alice", "pw", "tok"));
    }

    #[test]
    fn config_file_replaces_flags() {
        let path = std::env::temp_dir().join(format!("things-demo-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "base_url = \"http://localhost:3000/api/1/\"\nusername = \"bob\"\npassword = \"pw\"\napi_token = \"t\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from(["things-demo", "--config", path.to_str().unwrap()]).unwrap();
        let config = cli.client_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.base_url, "http://localhost:3000/api/1");
        assert_eq!(config.username, "bob");
    }

    fn reply(status: u16, body: Value, transport_error: Option<&str>) -> Reply {
        Reply {
            id: things_core::RequestId(1),
            method: things_core::HttpMethod::Post,
            url: things_core::Url::parse("http://localhost:3000/api/1/things").unwrap(),
            status,
            headers: Vec::new(),
            raw_body: body.to_string(),
            body,
            elapsed: std::time::Duration::from_millis(12),
            transport_error: transport_error.map(str::to_string),
        }
    }

    #[test]
    fn render_reply_includes_thing_id_and_status() {
        let out = render_reply("create a new thing", &reply(201, json!({"thingId": "t-1"}), None));
        assert!(out.starts_with("Request processed: \t create a new thing\n"));
        assert!(out.contains("HTTP status code: \t 201\n"));
        assert!(out.contains("Thing ID: \t\t t-1\n"));
        assert!(out.contains("Elapsed: \t\t 12 ms\n"));
    }

    #[test]
    fn render_errors_skips_successful_replies() {
        assert!(render_errors(&reply(200, json!([]), None)).is_none());
    }

    #[test]
    fn render_errors_lists_error_fields() {
        let out = render_errors(&reply(404, json!({"error": "things:thing.notfound", "status": 404}), None)).unwrap();
        assert!(out.contains("  error: things:thing.notfound\n"));
        assert!(out.contains("  status: 404\n"));
    }

    #[test]
    fn render_errors_reports_transport_failure() {
        let out = render_errors(&reply(0, Value::Null, Some("connection refused"))).unwrap();
        assert_eq!(out, "  transport: connection refused\n");
    }

    #[test]
    fn failed_flag_tracks_error_replies() {
        let failed = Failed::default();
        failed.report("list all available things", &reply(200, json!([]), None));
        assert!(!failed.get());
        failed.report("delete thing", &reply(403, json!({"error": "things:token.invalid"}), None));
        assert!(failed.get());
    }

    #[test]
    fn created_thing_id_needs_a_successful_reply() {
        assert_eq!(created_thing_id(&reply(201, json!({"thingId": "t-1"}), None)).as_deref(), Some("t-1"));
        assert_eq!(created_thing_id(&reply(409, json!({"thingId": "t-1"}), None)), None);
        assert_eq!(created_thing_id(&reply(201, Value::Null, None)), None);
        assert_eq!(created_thing_id(&reply(0, Value::Null, Some("connection refused"))), None);
    }

    #[test]
    fn sample_thing_matches_published_payload() {
        let thing = sample_thing();
        assert_eq!(thing["attributes"]["dimensions"]["width"], 123);
        assert_eq!(thing["attributes"]["dimensions"]["height"], 321);
        assert_eq!(thing["features"]["dimensions"]["scalable"], true);
    }
}
