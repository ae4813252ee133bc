//! Build commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use dockyard_core::Build;
use std::io::Write;

use crate::client::{ApiClient, segment};

fn repository_path(org: &str, repo: &str) -> String {
    format!(
        "organizations/{}/repositories/{}/builds",
        segment(org),
        segment(repo)
    )
}

fn duration(build: &Build) -> String {
    let end = build.finished_at.unwrap_or_else(Utc::now);
    let secs = (end - build.started_at).num_seconds().max(0);
    format!("{}m{:02}s", secs / 60, secs % 60)
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn summary_line(build: &Build) -> String {
    format!(
        "{}  {:<30} {:<5} {:<20} {:<12} {:<8} {}  {}",
        build.id,
        format!("{}/{}", build.organization, build.repository),
        build.event,
        build.branch,
        build.pipeline,
        build.status.as_str(),
        timestamp(&build.started_at),
        duration(build),
    )
}

pub async fn list(server: &str, repository: Option<(String, String)>, limit: Option<u32>) -> Result<()> {
    let client = ApiClient::new(server)?;
    let mut path = match &repository {
        Some((org, repo)) => repository_path(org, repo),
        None => "builds".to_string(),
    };
    if let Some(limit) = limit {
        path.push_str(&format!("?limit={}", limit));
    }

    let builds: Vec<Build> = client.get_json(&path).await?;
    if builds.is_empty() {
        println!("No builds");
        return Ok(());
    }
    for build in &builds {
        println!("{}", summary_line(build));
    }
    Ok(())
}

fn details(build: &Build) -> String {
    let mut out = String::new();
    out.push_str(&format!("Build      {}\n", build.id));
    out.push_str(&format!("Repository {}/{}\n", build.organization, build.repository));
    out.push_str(&format!("Event      {} on {}\n", build.event, build.branch));
    out.push_str(&format!("Pipeline   {}\n", build.pipeline));
    out.push_str(&format!("Status     {}\n", build.status));
    if let Some(error) = &build.error {
        out.push_str(&format!("Error      {}\n", error));
    }
    out.push_str(&format!(
        "Started    {} ({})\n",
        timestamp(&build.started_at),
        duration(build)
    ));
    for (key, value) in &build.env_vars {
        out.push_str(&format!("Env        {}={}\n", key, value));
    }
    if !build.tasks.is_empty() {
        out.push_str("Tasks\n");
        for (position, task) in build.tasks.iter().enumerate() {
            out.push_str(&format!(
                "  {}. {:<16} {:<8} {}\n",
                position + 1,
                task.name,
                task.status.as_str(),
                task.command
            ));
            if let Some(error) = &task.error {
                out.push_str(&format!("     {}\n", error));
            }
        }
    }
    out
}

pub async fn show(server: &str, org: &str, repo: &str, id: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    let path = format!("{}/{}", repository_path(org, repo), segment(id));
    let build: Build = client.get_json(&path).await?;
    print!("{}", details(&build));
    Ok(())
}

pub async fn logs(server: &str, org: &str, repo: &str, id: &str) -> Result<()> {
    let client = ApiClient::new(server)?;
    let path = format!("{}/{}/logs", repository_path(org, repo), segment(id));
    let log = client.get_bytes(&path).await?;
    std::io::stdout().write_all(&log)?;
    Ok(())
}
