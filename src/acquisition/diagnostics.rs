// Failure diagnostics - recognises why the upstream refused us
//
// Extractor stderr and HTTP errors are free text. We scan them for the
// well-known patterns so each recorded failure can carry a blocking reason
// and a short hint for the operator.

use serde::{Deserialize, Serialize};

/// Reasons an acquisition attempt is refused by the network or the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    /// TLS handshake failed on certificate verification
    CertificateRejected,

    /// HTTP 403 Forbidden
    Forbidden,

    /// HTTP 429 or an explicit rate-limit message
    RateLimited,

    /// Captcha / "confirm you're not a bot" interstitial
    BotDetection,

    /// Not available in the current country
    GeoBlocked,

    /// Age gate, private or members-only content
    SignInRequired,

    /// Removed, deleted or otherwise gone
    Unavailable,

    /// Timeout (often a soft IP block)
    NetworkTimeout,

    /// DNS, refused or reset connection
    ConnectionFailed,
}

impl BlockingReason {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::CertificateRejected => "TLS certificate verification failed",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::RateLimited => "Rate limited by the platform",
            Self::BotDetection => "Bot detection triggered",
            Self::GeoBlocked => "Geographic restriction",
            Self::SignInRequired => "Sign-in required (age-gated, private or members-only)",
            Self::Unavailable => "Video unavailable",
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::ConnectionFailed => "Connection could not be established",
        }
    }

    /// What the operator can try next
    pub fn hint(&self) -> &'static str {
        match self {
            Self::CertificateRejected => {
                "set TUBESCRIBE_INSECURE_TLS=1 or point SSL_CERT_FILE at a valid CA bundle"
            }
            Self::Forbidden => "update yt-dlp, or route traffic through a proxy",
            Self::RateLimited => "wait 10-15 minutes or use a different IP",
            Self::BotDetection => "use a fresh proxy/VPN or a different player client",
            Self::GeoBlocked => "use a proxy in a region where the video is available",
            Self::SignInRequired => "the video needs an authenticated session",
            Self::Unavailable => "the video was removed or made private",
            Self::NetworkTimeout => "check connectivity or raise the socket timeout",
            Self::ConnectionFailed => "check DNS, firewall and proxy settings",
        }
    }

    /// Whether retrying the same URL later could help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unavailable | Self::SignInRequired)
    }
}

/// Diagnose an error message. Returns `None` when nothing is recognised.
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    if lower.contains("certificate_verify_failed")
        || lower.contains("certificate verify failed")
        || lower.contains("invalid certificate")
        || lower.contains("self signed certificate")
        || lower.contains("self-signed certificate")
        || lower.contains("unable to get local issuer certificate")
    {
        return Some(BlockingReason::CertificateRejected);
    }

    if lower.contains("video unavailable")
        || lower.contains("this video is unavailable")
        || lower.contains("has been removed")
        || lower.contains("410 gone")
    {
        return Some(BlockingReason::Unavailable);
    }

    if lower.contains("sign in to confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("private video")
        || lower.contains("members only")
        || lower.contains("members-only")
    {
        return Some(BlockingReason::SignInRequired);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restriction")
        || lower.contains("geo-restricted")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit")
    {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Forbidden);
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        return Some(BlockingReason::NetworkTimeout);
    }

    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network is unreachable")
        || lower.contains("name or service not known")
        || lower.contains("failed to lookup address")
        || lower.contains("dns error")
    {
        return Some(BlockingReason::ConnectionFailed);
    }

    None
}
