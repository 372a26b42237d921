//! Built-in handler kinds constructed from manifests.

use crate::extension::Extension;
use crate::manifest::{ExtensionManifest, HandlerSpec};
use async_trait::async_trait;
use relay_common::{Error, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

/// Construct the handler a manifest declares.
pub fn build(manifest: ExtensionManifest) -> Arc<dyn Extension> {
    let ExtensionManifest {
        name,
        version,
        description,
        handler,
    } = manifest;

    match handler {
        HandlerSpec::Reply { triggers, template } => Arc::new(ReplyExtension {
            name,
            version,
            description,
            triggers: lowercase(triggers),
            template,
        }),
        HandlerSpec::Command {
            program,
            args,
            triggers,
            timeout_secs,
        } => Arc::new(CommandExtension {
            name,
            version,
            description,
            triggers: lowercase(triggers),
            program,
            args,
            timeout: Duration::from_secs(timeout_secs),
        }),
    }
}

fn lowercase(triggers: Vec<String>) -> Vec<String> {
    triggers.into_iter().map(|t| t.to_lowercase()).collect()
}

fn matches_trigger(triggers: &[String], message: &str) -> bool {
    let message = message.to_lowercase();
    triggers.iter().any(|t| message.contains(t))
}

// ============================================================================
// Reply
// ============================================================================

/// Keyword-triggered template reply.
struct ReplyExtension {
    name: String,
    version: String,
    description: String,
    triggers: Vec<String>,
    template: String,
}

#[async_trait]
impl Extension for ReplyExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn can_handle(&self, message: &str) -> bool {
        matches_trigger(&self.triggers, message)
    }

    async fn handle(&self, message: &str, _conversation_id: &str) -> Result<Option<String>> {
        Ok(Some(self.template.replace("{message}", message)))
    }
}

// ============================================================================
// Command
// ============================================================================

/// Runs an external program with the message appended to argv.
///
/// The conversation id is passed in `RELAY_CONVERSATION_ID`. Stdout is
/// the reply; an empty stdout declines the message.
struct CommandExtension {
    name: String,
    version: String,
    description: String,
    triggers: Vec<String>,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

#[async_trait]
impl Extension for CommandExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn can_handle(&self, message: &str) -> bool {
        matches_trigger(&self.triggers, message)
    }

    async fn handle(&self, message: &str, conversation_id: &str) -> Result<Option<String>> {
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .env("RELAY_CONVERSATION_ID", conversation_id)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExtensionHandler(format!("{}: spawn failed: {e}", self.name)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ExtensionHandler(format!("{}: command timed out", self.name)))?
            .map_err(|e| Error::ExtensionHandler(format!("{}: {e}", self.name)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExtensionHandler(format!(
                "{}: exited with {} ({})",
                self.name,
                output.status,
                stderr.trim()
            )));
        }

        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reply.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reply))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_manifest() -> ExtensionManifest {
        ExtensionManifest {
            name: "greeter".into(),
            version: "0.1.0".into(),
            description: "Greets people".into(),
            handler: HandlerSpec::Reply {
                triggers: vec!["Hello".into()],
                template: "You said: {message}".into(),
            },
        }
    }

    #[tokio::test]
    async fn reply_substitutes_the_message() {
        let ext = build(reply_manifest());
        let reply = ext.handle("hello there", "conv").await.unwrap();
        assert_eq!(reply.as_deref(), Some("You said: hello there"));
    }

    #[test]
    fn reply_triggers_are_case_insensitive() {
        let ext = build(reply_manifest());
        assert!(ext.can_handle("well HELLO friend"));
        assert!(!ext.can_handle("goodbye"));
    }

    #[tokio::test]
    async fn command_captures_stdout() {
        let ext = build(ExtensionManifest {
            name: "echoer".into(),
            version: "0.1.0".into(),
            description: "Echoes".into(),
            handler: HandlerSpec::Command {
                program: "echo".into(),
                args: vec!["reply:".into()],
                triggers: vec![],
                timeout_secs: 5,
            },
        });

        let reply = ext.handle("ping", "conv").await.unwrap();
        assert_eq!(reply.as_deref(), Some("reply: ping"));
    }

    #[tokio::test]
    async fn failing_command_is_a_handler_error() {
        let ext = build(ExtensionManifest {
            name: "failer".into(),
            version: "0.1.0".into(),
            description: String::new(),
            handler: HandlerSpec::Command {
                program: "false".into(),
                args: vec![],
                triggers: vec![],
                timeout_secs: 5,
            },
        });

        let err = ext.handle("anything", "conv").await.unwrap_err();
        assert!(matches!(err, Error::ExtensionHandler(_)));
    }

    #[tokio::test]
    async fn missing_program_is_a_handler_error() {
        let ext = build(ExtensionManifest {
            name: "ghost".into(),
            version: "0.1.0".into(),
            description: String::new(),
            handler: HandlerSpec::Command {
                program: "/nonexistent/relay-test-binary".into(),
                args: vec![],
                triggers: vec![],
                timeout_secs: 5,
            },
        });

        assert!(ext.handle("anything", "conv").await.is_err());
    }
}
