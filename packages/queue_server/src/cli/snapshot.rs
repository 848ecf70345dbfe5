use anyhow::{Context, Result, bail};

use conference_queue::TeacherId;

use crate::config::ClientConfig;
use crate::handlers::queues::QueueResponse;
use crate::queue_registry::QueueSummary;

pub async fn fetch_queue(config: &ClientConfig, teacher_id: &TeacherId) -> Result<QueueResponse> {
    let url = format!("{}/api/queues/{}", config.server_url, teacher_id);
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", config.server_url))?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        bail!("No queue for teacher '{}'", teacher_id);
    }
    let resp = resp.error_for_status()?;
    Ok(resp.json().await?)
}

pub async fn fetch_queue_list(config: &ClientConfig) -> Result<Vec<QueueSummary>> {
    let url = format!("{}/api/queues", config.server_url);
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", config.server_url))?
        .error_for_status()?;
    Ok(resp.json().await?)
}

/// `ptc snapshot`: one teacher's queue, or every queue when no teacher is given.
pub async fn snapshot_command(
    config: &ClientConfig,
    teacher_id: Option<TeacherId>,
    json: bool,
) -> Result<()> {
    match teacher_id {
        Some(teacher_id) => {
            let queue = fetch_queue(config, &teacher_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&queue)?);
            } else {
                println!("{} (version {})", queue.name, queue.version);
                print!("{}", queue.view);
            }
        }
        None => {
            let queues = fetch_queue_list(config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&queues)?);
            } else if queues.is_empty() {
                println!("No teachers on the roster");
            } else {
                print!("{}", format_queue_list(&queues));
            }
        }
    }
    Ok(())
}

fn format_queue_list(queues: &[QueueSummary]) -> String {
    let id_width = queues
        .iter()
        .map(|q| q.teacher_id.as_str().len())
        .max()
        .unwrap_or(0)
        .max("ID".len());
    let mut out = format!("{:<id_width$}  {:<24}  {:>7}  NOW MEETING\n", "ID", "NAME", "WAITING");
    for q in queues {
        let current = q.current.as_ref().map(|id| id.as_str()).unwrap_or("-");
        out.push_str(&format!(
            "{:<id_width$}  {:<24}  {:>7}  {}\n",
            q.teacher_id.as_str(),
            q.name,
            q.waiting,
            current
        ));
    }
    out
}
