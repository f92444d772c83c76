/// Process exit statuses of `painter-runner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Usage,
    MissingConfig,
    Fatal,
    ProvisioningError,
    ProvisioningTimeout,
    ReadinessTimeout,
    JobIdentityMissing,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Usage => 1,
            ExitCode::MissingConfig => 2,
            ExitCode::Fatal => 3,
            ExitCode::ProvisioningError => 10,
            ExitCode::ProvisioningTimeout => 11,
            ExitCode::ReadinessTimeout => 12,
            ExitCode::JobIdentityMissing => 13,
        }
    }
}
