//! Storage key constants.

/// Keys used in the session store.
pub struct StorageKeys;

impl StorageKeys {
    /// Cached "is authenticated" flag ("true" / "false")
    pub const AUTH_CACHE: &'static str = "authCache";

    /// Alternate identity token (authorization code from the external login)
    pub const ALT_TOKEN: &'static str = "altToken";

    /// Alternate identity email
    pub const ALT_EMAIL: &'static str = "altEmail";

    /// Alternate identity display name
    pub const ALT_DISPLAY_NAME: &'static str = "altDisplayName";

    /// Preferred active identity ("primary" / "alternate" / "unset")
    pub const ACTIVE_IDENTITY_PREFERENCE: &'static str = "activeIdentityPreference";

    /// Every key the session tools own, in sign-out order.
    pub const ALL: [&'static str; 5] = [
        Self::ALT_TOKEN,
        Self::ALT_EMAIL,
        Self::ALT_DISPLAY_NAME,
        Self::ACTIVE_IDENTITY_PREFERENCE,
        Self::AUTH_CACHE,
    ];
}
