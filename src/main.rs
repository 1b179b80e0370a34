// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{mcp_tool_names, parse_mcp_spec, Cli};
use runa_core::{Agent, AgentEvent};
use runa_model::OpenAiChatBackend;
use runa_rag::{store, Embedder, Indexer, VectorStore, VisionDescriber};
use runa_tools::{McpTool, ShellTool, SshTool, ToolRegistry, WikiTool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(ShellTool::default()));
    tools.register(Arc::new(SshTool));

    match setup(&cli, &mut tools).await {
        Ok(ExitAfterSetup::Yes) => {
            tools.release_all().await;
            return Ok(());
        }
        Ok(ExitAfterSetup::No) => {}
        Err(e) => {
            // Startup failure is fatal, but already-spawned MCP servers
            // still get a clean shutdown.
            tools.release_all().await;
            return Err(e);
        }
    }

    let backend = Arc::new(OpenAiChatBackend::new(&cli.base_url, cli.model.as_str()));
    let streaming = !cli.no_stream;
    let mut agent = Agent::new(backend, tools, cli.max_iter)
        .with_streaming(streaming)
        .with_events(Box::new(print_event));

    println!(
        "runa — model '{}' at {} ({} tools). Type /help for commands.",
        cli.model,
        cli.base_url,
        agent.tools().descriptors().len()
    );

    repl(&mut agent, streaming).await;

    agent.tools().release_all().await;
    Ok(())
}

enum ExitAfterSetup {
    Yes,
    No,
}

/// Attach MCP servers and build the wiki index; register the resulting
/// tools.  Any failure here is a startup failure.
async fn setup(cli: &Cli, tools: &mut ToolRegistry) -> anyhow::Result<ExitAfterSetup> {
    let specs: Vec<_> = cli.mcp.iter().map(|s| parse_mcp_spec(s)).collect();
    for (spec, name) in specs.iter().zip(mcp_tool_names(&specs)) {
        let tool = McpTool::connect(name.as_str(), &spec.target)
            .await
            .with_context(|| format!("cannot attach MCP server '{}'", spec.target))?;
        println!(
            "Attached MCP server as '{}' ({} tools)",
            name,
            tool.sub_tool_names().len()
        );
        tools.register(Arc::new(tool));
    }

    let Some(wiki_root) = &cli.wiki else {
        if cli.index_only {
            anyhow::bail!("--index-only requires --wiki <path>");
        }
        return Ok(ExitAfterSetup::No);
    };

    let store = Arc::new(VectorStore::new(&cli.qdrant, store::DEFAULT_COLLECTION));
    let embedder = Arc::new(Embedder::new(&cli.base_url, cli.embed_model.as_str()));
    let vision = VisionDescriber::new(&cli.base_url, cli.vision_model.as_str(), wiki_root);

    let indexer = Indexer::new(store.clone(), embedder.clone(), vision, wiki_root.clone());
    println!("Indexing wiki at {}…", wiki_root.display());
    let stats = indexer.index().await.context("wiki indexing failed")?;
    println!(
        "Indexed {} pages: {} text documents, {} image documents ({} images skipped)",
        stats.pages, stats.text_documents, stats.image_documents, stats.skipped_images
    );

    if cli.index_only {
        return Ok(ExitAfterSetup::Yes);
    }
    tools.register(Arc::new(WikiTool::new(embedder, store)));
    Ok(ExitAfterSetup::No)
}

/// Read-eval-print loop over stdin.  Blocking on user input between turns
/// is the agent's natural idle state.
async fn repl(agent: &mut Agent, streaming: bool) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // EOF or a broken terminal both end the session.
            Ok(None) | Err(_) => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "quit" | "exit" | "/quit" | "/exit" => break,
            "clear" | "/clear" => {
                agent.clear_history();
                println!("History cleared.");
                continue;
            }
            "/help" => {
                print_help();
                continue;
            }
            _ => {}
        }

        match agent.run(input).await {
            Ok(answer) => {
                if streaming {
                    // The answer was already printed chunk-by-chunk.
                    println!();
                } else {
                    println!("{answer}");
                }
            }
            Err(e) => eprintln!("Error: {e:#}"),
        }
    }
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::TextChunk(chunk) => {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::ToolCallStarted { name } => {
            println!("[calling tool '{name}'…]");
        }
        AgentEvent::ToolResult {
            name,
            preview,
            is_error,
        } => {
            if *is_error {
                println!("[tool '{name}' failed: {preview}]");
            } else {
                println!("[tool '{name}' returned: {preview}]");
            }
        }
    }
}

fn print_help() {
    println!(
        "Commands:\n\
         \x20 quit, exit, /exit   leave the agent\n\
         \x20 clear, /clear       reset conversation history\n\
         \x20 /help               this message\n\
         Anything else is sent to the model as a user turn."
    );
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
