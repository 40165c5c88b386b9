use super::VerifyAttempt;

const VERIFIED_MARKERS: [&str; 1] = ["successfully verified"];
const ALREADY_VERIFIED_MARKERS: [&str; 2] = ["already verified", "already been verified"];

/// Maps whatever the verification tool printed onto an attempt outcome.
/// The exit code alone is not trusted: some tools exit non-zero for "already verified".
pub fn classify_output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> VerifyAttempt {
    let combined = format!("{stdout}\n{stderr}").to_lowercase();

    if VERIFIED_MARKERS.iter().any(|m| combined.contains(m)) {
        return VerifyAttempt::Verified;
    }
    if ALREADY_VERIFIED_MARKERS.iter().any(|m| combined.contains(m)) {
        return VerifyAttempt::AlreadyVerified;
    }

    let reason = last_line(stderr)
        .or_else(|| last_line(stdout))
        .map(str::to_string)
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        });

    VerifyAttempt::Failed(reason)
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_marker() {
        let stdout = "Successfully submitted source code for contract\n\
                      Successfully verified contract MemeToken on the block explorer.\n";
        assert_eq!(classify_output(Some(0), stdout, ""), VerifyAttempt::Verified);
    }

    #[test]
    fn already_verified_on_either_stream() {
        assert_eq!(
            classify_output(Some(1), "", "Error: Contract source code already verified"),
            VerifyAttempt::AlreadyVerified
        );
        assert_eq!(
            classify_output(Some(0), "The contract 0xabc has already been verified.", ""),
            VerifyAttempt::AlreadyVerified
        );
    }

    #[test]
    fn failure_uses_last_meaningful_line() {
        let stderr = "Error in plugin verify:\nDoes not have bytecode at address\n\n";
        assert_eq!(
            classify_output(Some(1), "compiling...", stderr),
            VerifyAttempt::Failed("Does not have bytecode at address".to_string())
        );

        assert_eq!(
            classify_output(Some(1), "only stdout here\n", ""),
            VerifyAttempt::Failed("only stdout here".to_string())
        );
    }

    #[test]
    fn silent_failure_reports_exit() {
        assert_eq!(
            classify_output(Some(3), "", ""),
            VerifyAttempt::Failed("exit status 3".to_string())
        );
        assert_eq!(
            classify_output(None, "", " \n"),
            VerifyAttempt::Failed("terminated by signal".to_string())
        );
    }
}
