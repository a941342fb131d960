/// Time before token expiration when refresh is needed (in seconds).
/// Refresh ahead of expiry to avoid racing the upstream.
pub const TOKEN_REFRESH_THRESHOLD: i64 = 600;

/// Default upstream region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Kiro IDE version advertised in upstream user-agent headers.
pub const DEFAULT_KIRO_VERSION: &str = "0.8.0";

/// SDK identity the upstream expects in user-agent headers.
pub const AWS_SDK_UA: &str = "aws-sdk-js/1.0.27";

/// Returns the Q API host for the given region.
///
/// Example: `kiro_q_host("us-east-1")` → `"https://q.us-east-1.amazonaws.com"`
pub fn kiro_q_host(region: &str) -> String {
    format!("https://q.{}.amazonaws.com", region)
}

/// Bare host name for the `Host` header.
pub fn kiro_q_host_header(region: &str) -> String {
    format!("q.{}.amazonaws.com", region)
}

/// Returns the Kiro Desktop Auth token refresh URL for the given region.
///
/// Example: `kiro_refresh_url("us-east-1")` →
/// `"https://prod.us-east-1.auth.desktop.kiro.dev/refreshToken"`
pub fn kiro_refresh_url(region: &str) -> String {
    format!("https://prod.{}.auth.desktop.kiro.dev/refreshToken", region)
}

/// Machine id advertised to the upstream: the credential's own machine id,
/// or a fresh 32-byte hex string when the credential carries none.
pub fn machine_id_or_random(credential_machine_id: Option<&str>) -> String {
    match credential_machine_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => random_machine_id(),
    }
}

fn random_machine_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
