/// Out-of-band channel for handing a verification code to its owner.
pub trait CodeDelivery: Send + Sync {
    fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes the code to the service log. Stand-in until a mail channel exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl CodeDelivery for LogDelivery {
    fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!(target: "votechain::delivery", %email, %code, "verification code issued");
        Ok(())
    }
}
