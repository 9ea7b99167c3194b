//! Outbound chat and call requests.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Deserialize)]
struct QueuedResponse {
    queued: bool,
    targets: Vec<u16>,
}

#[derive(Serialize)]
struct SendRequest {
    text: String,
}

#[derive(Serialize)]
struct CallRequest<'a> {
    call_type: &'a str,
}

fn report(what: &str, resp: &QueuedResponse) {
    if resp.queued {
        println!("{} queued for ports {:?}", what, resp.targets);
    } else {
        println!("{} was not queued", what);
    }
}

pub async fn cmd_send(port: u16, text: String) -> Result<()> {
    let resp: QueuedResponse =
        post_json_body(&format!("{}/messages/send", base_url(port)), &SendRequest { text }).await?;
    report("Message", &resp);
    Ok(())
}

pub async fn cmd_call(port: u16, call_type: &str) -> Result<()> {
    let resp: QueuedResponse =
        post_json_body(&format!("{}/calls/request", base_url(port)), &CallRequest { call_type })
            .await?;
    report(&format!("{} call request", call_type), &resp);
    Ok(())
}
