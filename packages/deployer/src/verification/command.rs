use std::{collections::BTreeMap, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use deployer_types::{Credential, JobPayload, VerificationSettings};
use tokio::process::Command;

use super::{classify_output, SourceVerifier, VerificationRequest, VerifierError, VerifyAttempt};

/// Environment variable the api key is handed to the tool through
pub const API_KEY_ENV: &str = "VERIFICATION_API_KEY";

/// Runs an external verification tool, `npx hardhat verify` by default.
/// Arguments are passed as a list, never through a shell.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    pub program: String,
    pub args: Vec<String>,
    pub project_dir: Option<PathBuf>,
}

impl CommandVerifier {
    pub fn from_settings(settings: &VerificationSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            project_dir: settings.project_dir.clone(),
        }
    }

    /// Everything after the program name
    pub fn argv(&self, request: &VerificationRequest) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push("--network".to_string());
        argv.push(request.network.clone());
        if let Some(contract) = &request.contract {
            argv.push("--contract".to_string());
            argv.push(contract.clone());
        }
        argv.push(request.address.to_string());
        argv.extend(request.constructor_args.iter().cloned());
        argv
    }

    fn command(&self, request: &VerificationRequest, api_key: &Credential) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.argv(request))
            .env(API_KEY_ENV, api_key.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = &self.project_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl SourceVerifier for CommandVerifier {
    async fn verify(
        &self,
        request: &VerificationRequest,
        api_key: &Credential,
    ) -> Result<VerifyAttempt, VerifierError> {
        tracing::debug!("Running {} {}", self.program, self.argv(request).join(" "));

        let output = self
            .command(request, api_key)
            .output()
            .await
            .map_err(|source| VerifierError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(classify_output(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }
}

/// Which source file and contract the tool should match the bytecode against.
/// A custom path wins over the template table.
pub fn contract_hint(payload: &JobPayload, templates: &BTreeMap<u32, String>) -> Option<String> {
    if let Some(path) = payload
        .custom_contract_path
        .as_deref()
        .filter(|path| !path.trim().is_empty())
    {
        return Some(format!("{path}:{}", payload.token_name.replace(' ', "_")));
    }

    let name = templates.get(&payload.template_number?)?;
    Some(format!("contracts/ERC20/{name}.sol:{name}"))
}
