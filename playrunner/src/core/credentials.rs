//! Credentials handed to the engine for privilege escalation.

use zeroize::Zeroizing;

/// Privilege-escalation password passed through unmodified to every step.
///
/// Not `Display`, redacted in `Debug`, and zeroized on drop.
#[derive(Clone)]
pub struct BecomePassword(Zeroizing<String>);

impl BecomePassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for BecomePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BecomePassword(<redacted>)")
    }
}
