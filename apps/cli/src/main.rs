use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use voxrelay_core_sdk::{
    client::RelayClient,
    config::{ProviderConfig, ProviderPreset},
    relay::Relay,
    server,
    telemetry::{self, Sink},
};

/**
 * \brief CLI 程序入口：运行中继服务，或作为文本前端与中继对话。
 */
#[derive(Parser, Debug)]
#[command(name = "voxrelay", version, about = "Voice/text chat relay to a hosted chat-completion API")]
struct Cli {
    /** \brief 日志目录；缺省输出到 stderr */
    #[arg(long, global = true, env = "VOXRELAY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /** \brief 关闭诊断日志 */
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 启动中继服务：POST /api/chat。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,
        /** \brief 上游预设：openai 或 github-models */
        #[arg(long, env = "VOXRELAY_PROVIDER", default_value = "openai")]
        provider: ProviderPreset,
        /** \brief 静态前端目录（可选） */
        #[arg(long, env = "VOXRELAY_UI_DIR")]
        ui_dir: Option<PathBuf>,
    },

    /**
     * \brief 交互式文本对话。输入 /clear 清空会话，/quit 退出。
     */
    Chat {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        relay: String,
        #[arg(long)]
        model: Option<String>,
    },

    /**
     * \brief 单次提问，打印回复后退出。
     */
    Ask {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        relay: String,
        #[arg(long)]
        model: Option<String>,
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::set_sink(match (cli.quiet, cli.log_dir) {
        (true, _) => Sink::Off,
        (false, Some(dir)) => Sink::Dir(dir),
        (false, None) => Sink::Stderr,
    });

    match cli.command {
        Commands::Serve {
            addr,
            provider,
            ui_dir,
        } => {
            let config = ProviderConfig::from_env(provider).context("load provider config failed")?;
            let relay = Relay::new(config).context("build upstream client failed")?;
            server::run(&addr, relay, ui_dir).await?;
        }
        Commands::Chat { relay, model } => {
            let mut client = RelayClient::new(relay)?.with_model(model);
            println!("Type a message. /clear resets the conversation, /quit exits.");
            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush().ok();
                let mut line = String::new();
                if stdin.read_line(&mut line).context("read stdin failed")? == 0 {
                    break;
                }
                match line.trim() {
                    "" => continue,
                    "/quit" => break,
                    "/clear" => {
                        client.clear();
                        println!("(conversation cleared)");
                    }
                    text => match client.send(text).await {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => eprintln!("error: {:#}", e),
                    },
                }
            }
        }
        Commands::Ask { relay, model, text } => {
            let mut client = RelayClient::new(relay)?.with_model(model);
            let reply = client.send(&text).await.context("ask failed")?;
            println!("{}", reply);
        }
    }

    Ok(())
}
