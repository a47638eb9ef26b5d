//! Console chat front end: wires a human at the terminal to an LLM agent
//! through `dialog_loop`, persisting every turn to a markdown chat history.

mod cli;

use clap::Parser;
use promisegraph_agents::llm::{anthropic::anthropic_agent, openai::openai_agent};
use promisegraph_agents::{dialog_loop, Agent, ChatHistoryMd, ConsoleUserAgent};

use cli::{Cli, Provider};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    if let Err(err) = run(args).await {
        eprintln!("promisegraph-cli: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<(), String> {
    let assistant: std::sync::Arc<dyn Agent> = match args.provider {
        Provider::Openai => {
            let key = args
                .openai_api_key
                .ok_or("missing OPENAI_API_KEY (set it in the environment or a .env file)")?;
            openai_agent(args.model, key)
        }
        Provider::Anthropic => {
            let key = args.anthropic_api_key.ok_or(
                "missing ANTHROPIC_API_KEY (set it in the environment or a .env file)",
            )?;
            anthropic_agent(args.model, key)
        }
    };

    let user = ConsoleUserAgent::new(!args.no_echo);
    let chat_history = ChatHistoryMd::new(args.history_file);

    println!();
    match dialog_loop(&user, assistant.as_ref(), &chat_history, args.max_turns).await {
        Ok(_) => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}
