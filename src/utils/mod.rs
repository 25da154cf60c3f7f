use anyhow::Result;
use url::Url;

/// Hosts that serve `t.me` style message links
const TELEGRAM_HOSTS: &[&str] = &["t.me", "telegram.me", "telegram.dog"];

/// Check that a link points at a Telegram host before doing any work with it
pub fn validate_telegram_url(link: &str) -> Result<()> {
    let parsed = Url::parse(link.trim())
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", link))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    match extract_domain(link) {
        Some(host) if TELEGRAM_HOSTS.contains(&host.as_str()) => Ok(()),
        Some(host) => anyhow::bail!("Not a Telegram link (host is {})", host),
        None => anyhow::bail!("URL has no host: {}", link),
    }
}

/// Split a user-supplied list of links on commas, newlines or whitespace
pub fn split_links<S: AsRef<str>>(inputs: &[S]) -> Vec<String> {
    inputs
        .iter()
        .flat_map(|input| {
            input
                .as_ref()
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(str::trim)
                .filter(|link| !link.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()?
        .host_str()
        .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// External tools used by optional pipeline steps
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("ffprobe", "-version").await {
        missing.push("ffprobe - required to inspect audio tracks when transcode.enabled is set".to_string());
    }

    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required to filter audio tracks when transcode.enabled is set".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_split_links() {
        let links = split_links(&[
            "https://t.me/c/1/2,https://t.me/c/1/3",
            "  https://t.me/c/1/4\nhttps://t.me/c/1/5  ",
            ",,",
        ]);
        assert_eq!(
            links,
            vec![
                "https://t.me/c/1/2",
                "https://t.me/c/1/3",
                "https://t.me/c/1/4",
                "https://t.me/c/1/5",
            ]
        );
    }

    #[test]
    fn test_split_links_keeps_order_and_duplicates() {
        let links = split_links(&["b a b"]);
        assert_eq!(links, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.t.me/c/1/2"), Some("t.me".to_string()));
        assert_eq!(extract_domain("https://telegram.me/c/1/2"), Some("telegram.me".to_string()));
        assert_eq!(extract_domain("invalid-url"), None);
    }

    #[test]
    fn test_validate_telegram_url() {
        assert!(validate_telegram_url("https://t.me/c/1234567890/555").is_ok());
        assert!(validate_telegram_url("http://telegram.me/c/1/2").is_ok());
        assert!(validate_telegram_url("https://youtube.com/c/1/2").is_err());
        assert!(validate_telegram_url("ftp://t.me/c/1/2").is_err());
        assert!(validate_telegram_url("not-a-url").is_err());
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        assert!(!check_command_available("definitely-not-a-real-binary", "--version").await);
    }
}
