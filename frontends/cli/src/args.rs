use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub const USAGE: &str = "\
usage: todo [--config <file>] <command>

commands:
  list                          show all to-dos
  add <title> [--image <file>]  create a to-do, optionally with an image
  done <id>                     toggle the done flag
  rename <id> <title>           change the title
  rm <id>                       delete a to-do
  search <term>                 show to-dos whose title contains <term>
  image <id> [--out <file>]     download the image of a to-do

Without --config, SUPABASE_URL and SUPABASE_KEY are read from the environment.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Add { title: String, image: Option<PathBuf> },
    Done { id: i64 },
    Rename { id: i64, title: String },
    Remove { id: i64 },
    Search { term: String },
    Image { id: i64, out: Option<PathBuf> },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Invocation> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut image = None;
    let mut out = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config_path = Some(PathBuf::from(value_of(&arg, args.next())?)),
            "--image" | "-i" => image = Some(PathBuf::from(value_of(&arg, args.next())?)),
            "--out" | "-o" => out = Some(PathBuf::from(value_of(&arg, args.next())?)),
            "--help" | "-h" => {
                return Ok(Invocation {
                    config_path,
                    command: Command::Help,
                })
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None | Some("help") => Command::Help,
        Some("list" | "ls") => Command::List,
        Some("add") => Command::Add {
            title: rest_as_text(positional, "add")?,
            image,
        },
        Some("done") => Command::Done {
            id: parse_id(positional.next())?,
        },
        Some("rename") => {
            let id = parse_id(positional.next())?;
            Command::Rename {
                id,
                title: rest_as_text(positional, "rename")?,
            }
        }
        Some("rm" | "delete") => Command::Remove {
            id: parse_id(positional.next())?,
        },
        // An empty term is allowed and lists everything
        Some("search") => Command::Search {
            term: positional.collect::<Vec<_>>().join(" "),
        },
        Some("image") => Command::Image {
            id: parse_id(positional.next())?,
            out,
        },
        Some(other) => bail!("unknown command '{}'\n\n{}", other, USAGE),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn value_of(flag: &str, value: Option<String>) -> Result<String> {
    value.with_context(|| format!("{} needs a value", flag))
}

fn parse_id(arg: Option<String>) -> Result<i64> {
    let arg = arg.context("missing to-do id")?;
    arg.parse()
        .with_context(|| format!("'{}' is not a to-do id", arg))
}

fn rest_as_text(rest: impl Iterator<Item = String>, command: &str) -> Result<String> {
    let text = rest.collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        bail!("{} needs a title", command);
    }
    Ok(text)
}
