use crate::error::{CoordError, Result};

pub const AGENT_ID_MAX_LEN: usize = 120;
pub const TASK_ID_MIN_LEN: usize = 4;
pub const TITLE_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 2_000;
pub const FILES_MAX: usize = 200;
pub const COMMAND_MAX_LEN: usize = 2_000;
pub const ACCEPTANCE_MIN_LEN: usize = 10;
pub const ACCEPTANCE_MAX_LEN: usize = 4_000;
pub const OUTPUT_MAX_LEN: usize = 500_000;
pub const TTL_MAX_SECONDS: u32 = 3_600;
pub const STORY_POINTS_MIN: i32 = 1;
pub const STORY_POINTS_MAX: i32 = 21;
pub const WIP_LIMIT_MIN: u32 = 1;
pub const WIP_LIMIT_MAX: u32 = 100;

/// Gate commands must start with one of these tool invocations.
pub const GATE_COMMAND_PREFIXES: [&str; 16] = [
    "npm ", "pnpm ", "yarn ", "bun ", "pytest ", "jest ", "vitest ", "mocha ", "eslint ", "tsc ",
    "prettier ", "cargo ", "go ", "make ", "docker ", "kubectl ",
];

/// Shell metacharacters forbidden anywhere in a gate command.
const SHELL_METACHARS: [char; 17] = [
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '\\', '!', '\n', '\r',
];

/// Input-shape validation shared by the kernel and the HTTP edge.
///
/// The kernel calls these before mutating state, so a misbehaving caller
/// that bypasses the HTTP layer still cannot corrupt the store. Lengths
/// are counted in characters, not bytes.
///
/// # Examples
///
/// ```rust
/// use foreman_core::validation::Validate;
///
/// assert!(Validate::agent_id("backend-agent").is_ok());
/// assert!(Validate::title("Fix login").is_ok());
/// assert!(Validate::title("").is_err());
/// ```
pub struct Validate;

impl Validate {
    /// Validate an agent identifier.
    ///
    /// Agent ids must be 1-120 characters long; any content is allowed.
    ///
    /// # Arguments
    /// * `agent_id` - The agent identifier to validate
    ///
    /// # Returns
    /// * `Ok(())` - If the id is valid
    /// * `Err(CoordError::Validation)` - If the id is empty or too long
    pub fn agent_id(agent_id: &str) -> Result<()> {
        if agent_id.is_empty() {
            return Err(CoordError::empty_field("agentId"));
        }
        if agent_id.chars().count() > AGENT_ID_MAX_LEN {
            return Err(CoordError::out_of_range(
                "agentId",
                "must be at most 120 characters",
            ));
        }
        Ok(())
    }

    /// Validate a task identifier.
    ///
    /// Task ids are opaque but must be at least 4 characters, which every
    /// kernel-assigned id satisfies.
    ///
    /// # Arguments
    /// * `task_id` - The task identifier to validate
    ///
    /// # Returns
    /// * `Ok(())` - If the id is plausible
    /// * `Err(CoordError::Validation)` - If the id is too short
    pub fn task_id(task_id: &str) -> Result<()> {
        if task_id.chars().count() < TASK_ID_MIN_LEN {
            return Err(CoordError::out_of_range(
                "taskId",
                "must be at least 4 characters",
            ));
        }
        Ok(())
    }

    /// Validate a task title.
    ///
    /// Titles must be 1-200 characters and not blank.
    ///
    /// # Arguments
    /// * `title` - The title to validate
    ///
    /// # Returns
    /// * `Ok(())` - If the title is valid
    /// * `Err(CoordError::Validation)` - If the title is blank or too long
    pub fn title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(CoordError::empty_field("title"));
        }
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(CoordError::out_of_range(
                "title",
                "must be at most 200 characters",
            ));
        }
        Ok(())
    }

    /// Validate a task description (at most 2,000 characters).
    ///
    /// # Returns
    /// * `Ok(())` - If the description fits
    /// * `Err(CoordError::Validation)` - If it is too long
    pub fn description(description: &str) -> Result<()> {
        if description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(CoordError::out_of_range(
                "description",
                "must be at most 2000 characters",
            ));
        }
        Ok(())
    }

    /// Validate a file-path list.
    ///
    /// File lists must:
    /// - Contain 1-200 entries
    /// - Contain no empty paths
    ///
    /// # Arguments
    /// * `files` - The paths an intent or claim names
    ///
    /// # Returns
    /// * `Ok(())` - If the list is valid
    /// * `Err(CoordError::Validation)` - If it is empty, oversized, or
    ///   contains an empty path
    pub fn files(files: &[String]) -> Result<()> {
        if files.is_empty() {
            return Err(CoordError::empty_field("files"));
        }
        if files.len() > FILES_MAX {
            return Err(CoordError::out_of_range(
                "files",
                "must contain at most 200 paths",
            ));
        }
        if files.iter().any(|f| f.is_empty()) {
            return Err(CoordError::Validation(
                "file paths must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate an evidence command (1-2,000 characters).
    ///
    /// # Returns
    /// * `Ok(())` - If the command fits
    /// * `Err(CoordError::Validation)` - If it is empty or too long
    pub fn command(command: &str) -> Result<()> {
        if command.is_empty() {
            return Err(CoordError::empty_field("command"));
        }
        if command.chars().count() > COMMAND_MAX_LEN {
            return Err(CoordError::out_of_range(
                "command",
                "must be at most 2000 characters",
            ));
        }
        Ok(())
    }

    /// Validate intent acceptance criteria (10-4,000 characters).
    ///
    /// # Returns
    /// * `Ok(())` - If the text is within bounds
    /// * `Err(CoordError::Validation)` - If it is too short or too long
    pub fn acceptance_criteria(criteria: &str) -> Result<()> {
        let len = criteria.chars().count();
        if !(ACCEPTANCE_MIN_LEN..=ACCEPTANCE_MAX_LEN).contains(&len) {
            return Err(CoordError::out_of_range(
                "acceptanceCriteria",
                "must be 10..=4000 characters",
            ));
        }
        Ok(())
    }

    /// Validate a story-point estimate (integer in 1..=21).
    ///
    /// # Returns
    /// * `Ok(())` - If the estimate is in range
    /// * `Err(CoordError::Validation)` - Otherwise
    pub fn story_points(points: i32) -> Result<()> {
        if !(STORY_POINTS_MIN..=STORY_POINTS_MAX).contains(&points) {
            return Err(CoordError::out_of_range(
                "storyPoints",
                "must be an integer in 1..=21",
            ));
        }
        Ok(())
    }

    /// Validate a claim TTL or extension request.
    ///
    /// The boundary accepts any positive value up to an hour; the claim
    /// engine applies its own floor when granting.
    ///
    /// # Arguments
    /// * `ttl` - The requested duration in seconds
    ///
    /// # Returns
    /// * `Ok(())` - If the value is positive and at most 3600
    /// * `Err(CoordError::Validation)` - Otherwise
    pub fn ttl_seconds(ttl: u32) -> Result<()> {
        if ttl == 0 || ttl > TTL_MAX_SECONDS {
            return Err(CoordError::out_of_range(
                "ttlSeconds",
                "must be a positive integer at most 3600",
            ));
        }
        Ok(())
    }

    /// Validate inbound command output (at most 500,000 characters; the
    /// journals clip to 20,000 on storage).
    ///
    /// # Returns
    /// * `Ok(())` - If the payload is acceptable
    /// * `Err(CoordError::Validation)` - If it is too large
    pub fn output(output: &str) -> Result<()> {
        if output.chars().count() > OUTPUT_MAX_LEN {
            return Err(CoordError::out_of_range(
                "output",
                "must be at most 500000 characters",
            ));
        }
        Ok(())
    }

    /// Validate a WIP limit value (integer in 1..=100).
    ///
    /// # Returns
    /// * `Ok(())` - If the cap is in range
    /// * `Err(CoordError::Validation)` - Otherwise
    pub fn wip_limit(limit: u32) -> Result<()> {
        if !(WIP_LIMIT_MIN..=WIP_LIMIT_MAX).contains(&limit) {
            return Err(CoordError::out_of_range("limit", "must be 1..=100"));
        }
        Ok(())
    }

    /// Validate a gate command.
    ///
    /// Gate commands must:
    /// - Be 1-2,000 characters long
    /// - Start with an allow-listed tool invocation (see
    ///   [`GATE_COMMAND_PREFIXES`])
    /// - Contain no shell metacharacters
    ///
    /// The command is recorded, never run through a shell, but the
    /// allowlist keeps stored commands copy-paste safe.
    ///
    /// # Arguments
    /// * `command` - The command a gate definition carries
    ///
    /// # Returns
    /// * `Ok(())` - If the command is acceptable
    /// * `Err(CoordError::Validation)` - If the tool is not allow-listed
    ///   or a forbidden character appears
    ///
    /// # Examples
    ///
    /// ```rust
    /// use foreman_core::validation::Validate;
    ///
    /// assert!(Validate::gate_command("npm test").is_ok());
    /// assert!(Validate::gate_command("cargo test --workspace").is_ok());
    ///
    /// // Not an allow-listed tool.
    /// assert!(Validate::gate_command("bash run.sh").is_err());
    /// // Shell metacharacters are rejected outright.
    /// assert!(Validate::gate_command("npm test; rm -rf /").is_err());
    /// ```
    pub fn gate_command(command: &str) -> Result<()> {
        Self::command(command)?;
        if !GATE_COMMAND_PREFIXES
            .iter()
            .any(|prefix| command.starts_with(prefix))
        {
            let tools: Vec<&str> = GATE_COMMAND_PREFIXES
                .iter()
                .map(|p| p.trim_end())
                .collect();
            return Err(CoordError::Validation(format!(
                "gate command must start with an allow-listed tool: {}",
                tools.join(", ")
            )));
        }
        if let Some(bad) = command.chars().find(|c| SHELL_METACHARS.contains(c)) {
            return Err(CoordError::Validation(format!(
                "gate command contains forbidden character {bad:?}"
            )));
        }
        Ok(())
    }

    /// Validate a webhook target URL.
    ///
    /// Webhook targets must:
    /// - Use `https`
    /// - Not point at loopback, private or link-local hosts
    ///
    /// # Arguments
    /// * `url` - The URL a webhook registration carries
    ///
    /// # Returns
    /// * `Ok(())` - If the target is publicly reachable
    /// * `Err(CoordError::Validation)` - If the scheme or host is refused
    ///
    /// # Examples
    ///
    /// ```rust
    /// use foreman_core::validation::Validate;
    ///
    /// assert!(Validate::webhook_url("https://hooks.example.com/x").is_ok());
    /// assert!(Validate::webhook_url("http://hooks.example.com/x").is_err());
    /// assert!(Validate::webhook_url("https://127.0.0.1/x").is_err());
    /// assert!(Validate::webhook_url("https://192.168.1.5/x").is_err());
    /// ```
    pub fn webhook_url(url: &str) -> Result<()> {
        let rest = url.strip_prefix("https://").ok_or_else(|| {
            CoordError::Validation("webhook url must use https".to_string())
        })?;

        let host = if let Some(bracketed) = rest.strip_prefix('[') {
            // IPv6 literal, e.g. https://[::1]:8443/hook
            bracketed.split(']').next().unwrap_or_default()
        } else {
            rest.split(&['/', ':', '?', '#'][..]).next().unwrap_or_default()
        };

        if host.is_empty() {
            return Err(CoordError::Validation(
                "webhook url has no host".to_string(),
            ));
        }
        if Self::is_internal_host(&host.to_ascii_lowercase()) {
            return Err(CoordError::Validation(format!(
                "webhook host '{host}' is not reachable from the public internet"
            )));
        }
        Ok(())
    }

    fn is_internal_host(host: &str) -> bool {
        if host == "localhost" || host == "::1" || host == "0.0.0.0" {
            return true;
        }
        if host.starts_with("127.")
            || host.starts_with("10.")
            || host.starts_with("192.168.")
            || host.starts_with("169.254.")
        {
            return true;
        }
        // 172.16.0.0/12
        if let Some(rest) = host.strip_prefix("172.") {
            if let Some(second) = rest.split('.').next() {
                if let Ok(octet) = second.parse::<u8>() {
                    return (16..=31).contains(&octet);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_bounds() {
        assert!(Validate::agent_id("a").is_ok());
        assert!(Validate::agent_id(&"x".repeat(120)).is_ok());
        assert!(Validate::agent_id("").is_err());
        assert!(Validate::agent_id(&"x".repeat(121)).is_err());
    }

    #[test]
    fn task_id_minimum_length() {
        assert!(Validate::task_id("abcd").is_ok());
        assert!(Validate::task_id("abc").is_err());
    }

    #[test]
    fn title_bounds() {
        assert!(Validate::title("Fix login").is_ok());
        assert!(Validate::title("").is_err());
        assert!(Validate::title("   ").is_err());
        assert!(Validate::title(&"t".repeat(200)).is_ok());
        assert!(Validate::title(&"t".repeat(201)).is_err());
    }

    #[test]
    fn files_bounds() {
        let one = vec!["src/a.rs".to_string()];
        assert!(Validate::files(&one).is_ok());
        assert!(Validate::files(&[]).is_err());
        assert!(Validate::files(&vec!["".to_string()]).is_err());

        let many: Vec<String> = (0..200).map(|i| format!("f{i}")).collect();
        assert!(Validate::files(&many).is_ok());
        let too_many: Vec<String> = (0..201).map(|i| format!("f{i}")).collect();
        assert!(Validate::files(&too_many).is_err());
    }

    #[test]
    fn acceptance_criteria_bounds() {
        assert!(Validate::acceptance_criteria("All tests pass").is_ok());
        assert!(Validate::acceptance_criteria("too short").is_err());
        assert!(Validate::acceptance_criteria(&"a".repeat(4_000)).is_ok());
        assert!(Validate::acceptance_criteria(&"a".repeat(4_001)).is_err());
    }

    #[test]
    fn story_points_bounds() {
        assert!(Validate::story_points(1).is_ok());
        assert!(Validate::story_points(21).is_ok());
        assert!(Validate::story_points(0).is_err());
        assert!(Validate::story_points(22).is_err());
        assert!(Validate::story_points(-3).is_err());
    }

    #[test]
    fn ttl_bounds() {
        assert!(Validate::ttl_seconds(1).is_ok());
        assert!(Validate::ttl_seconds(3_600).is_ok());
        assert!(Validate::ttl_seconds(0).is_err());
        assert!(Validate::ttl_seconds(3_601).is_err());
    }

    #[test]
    fn gate_command_allowlist() {
        assert!(Validate::gate_command("npm test").is_ok());
        assert!(Validate::gate_command("cargo test --workspace").is_ok());
        assert!(Validate::gate_command("kubectl get pods").is_ok());

        // Not on the allowlist.
        assert!(Validate::gate_command("rm -rf /").is_err());
        assert!(Validate::gate_command("bash run.sh").is_err());
        // Prefix must include the trailing space.
        assert!(Validate::gate_command("npmx test").is_err());
    }

    #[test]
    fn gate_command_rejects_shell_metachars() {
        for cmd in [
            "npm test; rm -rf /",
            "npm test && echo done",
            "npm test | tee log",
            "npm test `whoami`",
            "npm test $(id)",
            "npm test > out.txt",
            "npm test {a,b}",
            "npm test [ok]",
            "npm test \\",
            "npm test!",
            "npm test\nrm x",
        ] {
            assert!(Validate::gate_command(cmd).is_err(), "accepted: {cmd:?}");
        }
    }

    #[test]
    fn webhook_url_requires_https() {
        assert!(Validate::webhook_url("https://hooks.example.com/x").is_ok());
        assert!(Validate::webhook_url("http://hooks.example.com/x").is_err());
        assert!(Validate::webhook_url("ftp://example.com").is_err());
    }

    #[test]
    fn webhook_url_rejects_internal_hosts() {
        for url in [
            "https://localhost/hook",
            "https://LOCALHOST/hook",
            "https://127.0.0.1/hook",
            "https://127.1.2.3:8443/hook",
            "https://[::1]/hook",
            "https://0.0.0.0/hook",
            "https://10.1.2.3/hook",
            "https://172.16.0.1/hook",
            "https://172.31.255.1/hook",
            "https://192.168.1.5/hook",
            "https://169.254.0.9/hook",
        ] {
            assert!(Validate::webhook_url(url).is_err(), "accepted: {url}");
        }
        // 172.15.* and 172.32.* are public.
        assert!(Validate::webhook_url("https://172.15.0.1/hook").is_ok());
        assert!(Validate::webhook_url("https://172.32.0.1/hook").is_ok());
    }
}
