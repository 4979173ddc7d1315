//! Stable user identity derived from tool credentials

/// `user-` followed by the first 12 hex digits of `md5("<lc_session>-<gh_token>")`
///
/// The same pair of credentials always maps to the same id, so memories and
/// sessions follow a user across browser sessions and processes.
pub fn generate_user_id(lc_session: &str, gh_token: &str) -> String {
    let digest = md5::compute(format!("{}-{}", lc_session, gh_token));
    let hex = format!("{:x}", digest);
    format!("user-{}", &hex[..12])
}
