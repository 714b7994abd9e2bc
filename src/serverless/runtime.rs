//! Local function runtime
//!
//! Reads newline-delimited invocation events from stdin and writes one
//! response document per line to stdout. Events are handled in order, one at
//! a time, the way a single function instance receives them.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{error_response, invoke};
use crate::adapter::serverless::ServerlessEvent;
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::error::AppError;
use crate::logger;

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    logger::log_serverless_start(&config);
    let context = ExecutionContext::from_config(config);
    serve_lines(&context, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(())
}

/// Answer every event line until the input closes
pub async fn serve_lines<R, W>(
    context: &ExecutionContext,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ServerlessEvent>(&line) {
            Ok(event) => invoke(context, event).await,
            Err(e) => {
                logger::log_warning(&format!("Discarding malformed invocation event: {e}"));
                error_response(&AppError::bad_body(format!("invalid invocation event: {e}")))
            }
        };

        let mut out = serde_json::to_vec(&response).map_err(std::io::Error::other)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::serverless::ServerlessResponse;

    #[tokio::test]
    async fn test_one_response_per_event_line() {
        let context = ExecutionContext::from_config(Config::defaults().unwrap());
        let input = concat!(
            r#"{"httpMethod":"GET","path":"/api/hello"}"#,
            "\n\n",
            "not json\n",
            r#"{"httpMethod":"OPTIONS","path":"/api/process"}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve_lines(&context, input.as_bytes(), &mut output).await.unwrap();

        let responses: Vec<ServerlessResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let statuses: Vec<u16> = responses.iter().map(|r| r.status_code).collect();
        assert_eq!(statuses, vec![200, 400, 204]);
    }
}
