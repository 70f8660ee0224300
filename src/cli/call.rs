use anyhow::Context;
use clap::Args;
use std::io::Read;
use switchyard_llm::{Message, Options, ResponseFormat, Router, RouterSettings};

/// Arguments for `switchyard call`
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Task name
    pub task: String,

    /// User prompt (read from stdin when omitted)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Output token cap
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Ask for a JSON object
    #[arg(long)]
    pub json: bool,

    /// Traffic-split routing key
    #[arg(long)]
    pub routing_key: Option<String>,

    /// Per-invocation timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the full result with provenance instead of the content
    #[arg(long)]
    pub details: bool,
}

impl CallArgs {
    fn options(&self) -> Options {
        let mut options = Options::new();
        options.max_tokens = self.max_tokens;
        options.temperature = self.temperature;
        options.routing_key = self.routing_key.clone();
        options.timeout_secs = self.timeout_secs;
        if self.json {
            options.response_format = Some(ResponseFormat::JsonObject);
        }
        options
    }

    fn messages(&self) -> anyhow::Result<Vec<Message>> {
        let prompt = match &self.prompt {
            Some(prompt) => prompt.clone(),
            None => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read prompt from stdin")?;
                buf
            }
        };
        if prompt.trim().is_empty() {
            anyhow::bail!("Prompt is empty");
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.as_str()));
        }
        messages.push(Message::user(prompt));
        Ok(messages)
    }
}

pub async fn run(settings: RouterSettings, args: &CallArgs) -> anyhow::Result<()> {
    let messages = args.messages()?;
    let router = Router::from_settings(settings).context("Failed to initialize router")?;

    let result = router
        .call_with_details(&args.task, &messages, &args.options())
        .await
        .with_context(|| format!("Call for task '{}' failed", args.task))?;

    if args.details {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> CallArgs {
        CallArgs {
            task: "summarize".to_string(),
            prompt: Some("hello".to_string()),
            system: Some("be brief".to_string()),
            max_tokens: Some(200),
            temperature: None,
            json: true,
            routing_key: None,
            timeout_secs: None,
            details: false,
        }
    }

    #[test]
    fn test_options_from_args() {
        let options = args().options();
        assert_eq!(options.max_tokens, Some(200));
        assert_eq!(options.response_format, Some(ResponseFormat::JsonObject));
        assert!(options.temperature.is_none());
    }

    #[test]
    fn test_messages_from_args() {
        let messages = args().messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hello");
    }
}
