//! Request command implementation.

use std::io::{self, Read};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;

use quire_http::{ApiRequest, AuthSession, AuthenticatedTransport, Method};

use crate::output;

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    pub method: String,

    /// Endpoint path relative to the API URL (e.g. projects/42)
    pub path: String,

    /// JSON body, `@file` to read a file, or `-` for stdin
    #[arg(long)]
    pub body: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "query", short = 'q', value_parser = parse_query_pair)]
    pub query: Vec<(String, String)>,
}

fn parse_query_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

fn read_body(arg: &str) -> Result<Value> {
    let text = if arg == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    } else if let Some(path) = arg.strip_prefix('@') {
        std::fs::read_to_string(path).context("Failed to read body file")?
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).context("Body is not valid JSON")
}

pub async fn run(args: RequestArgs, session: AuthSession) -> Result<()> {
    let method = Method::from_str(&args.method.to_ascii_uppercase())
        .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;

    let mut request = ApiRequest::new(method, args.path.trim_start_matches('/'));
    if let Some(body) = args.body.as_deref() {
        request = request.with_json(&read_body(body)?)?;
    }
    for (key, value) in args.query {
        request = request.with_query(key, value);
    }

    let transport = AuthenticatedTransport::new(session);
    let response = transport
        .dispatch(request)
        .await
        .context("Request failed")?;

    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;

    if status.is_success() {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => output::json_pretty(&value)?,
            Err(_) if text.is_empty() => {}
            Err(_) => println!("{}", text),
        }
        Ok(())
    } else {
        if !text.is_empty() {
            output::error(&text);
        }
        bail!("HTTP {}", status)
    }
}
