use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "inkgloss", version, about = "X-Ray and Word Wise annotation for e-books")]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump the book's text regions as JSONL for an external tagger.
    Regions {
        book: String,
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<String>,
    },
    /// Annotate the book in place.
    Annotate {
        #[arg(long, default_value = "inkgloss.yaml")]
        config: String,
    },
    /// Write an X-Ray database instead of touching the book.
    XRayDb {
        #[arg(long, default_value = "inkgloss.yaml")]
        config: String,
        #[arg(long)]
        out: String,
    },
    Custom {
        #[command(subcommand)]
        action: CustomCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CustomCommand {
    List {
        file: String,
    },
    Add {
        file: String,
        name: String,
        #[arg(long, default_value = "PERSON")]
        label: String,
        /// Comma separated.
        #[arg(long, default_value = "")]
        aliases: String,
        #[arg(long, default_value = "")]
        description: String,
        /// 1 for Wikipedia, 2 for the configured MediaWiki server; book quote
        /// when omitted.
        #[arg(long)]
        source: Option<u8>,
        #[arg(long, default_value_t = false)]
        omit: bool,
    },
    Remove {
        file: String,
        name: String,
    },
}
