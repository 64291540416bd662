use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Local;
use tracing::info;

/// Kebab-case topic slug from the first five words of a research request.
/// Only alphanumerics and dashes survive.
pub fn slugify_topic(message: &str) -> String {
    let slug = message
        .to_lowercase()
        .split_whitespace()
        .take(5)
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '-')
        .collect::<String>();
    slug.trim_matches('-').to_string()
}

/// Launch a detached researcher: a fire-and-forget `claude -p` subprocess
/// told to write its findings to a timestamped file under `output_dir`.
/// Returns that path immediately; the caller does not wait.
pub fn spawn_research(
    binary: &str,
    query: &str,
    output_dir: &Path,
    topic_slug: &str,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let timestamp = Local::now().format("%Y-%m-%d-%H-%M");
    let output_file = output_dir.join(format!("{timestamp}-{topic_slug}.md"));

    let prompt = format!(
        "Research the following topic thoroughly using web search:\n\n\
         {query}\n\n\
         Write your findings to: {}\n\n\
         Requirements:\n\
         - Use WebSearch to find current, relevant information\n\
         - Include sources and links\n\
         - Structure with clear markdown sections\n\
         - Be comprehensive but focused\n\
         - Write directly to the file path above\n",
        output_file.display()
    );

    let mut command = Command::new(binary);
    command
        .args(["-p", "--dangerously-skip-permissions", "--output-format", "text"])
        .current_dir(output_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Detach from our process group so the researcher outlives the request
    // (and any server restart).
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        // Closing stdin is what lets claude start; it waits for EOF.
        stdin.write_all(prompt.as_bytes())?;
    }

    info!(topic = %topic_slug, output = %output_file.display(), "spawned research subprocess");
    Ok(output_file)
}
