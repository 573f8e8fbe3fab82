use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use todo_sync::{SyncConfig, SyncEngine, TodoItemImage, TodoRecord};
use tracing::info;

use crate::args::{Command, Invocation, USAGE};

pub async fn run(invocation: Invocation) -> Result<()> {
    if invocation.command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = match &invocation.config_path {
        Some(path) => SyncConfig::load_from_file(path)?,
        None => SyncConfig::from_env()?,
    };
    let engine = SyncEngine::connect(&config)?;

    match invocation.command {
        Command::Help => {}
        Command::List => {
            engine.fetch_all().await?;
            print_todos(&engine.todos());
        }
        Command::Search { term } => {
            engine.filter(&term).await?;
            print_todos(&engine.todos());
        }
        Command::Add { title, image } => {
            let image = match image {
                Some(path) => Some(load_image(&path)?),
                None => None,
            };
            let created = engine.create(&title, image.as_ref()).await?;
            print_todos(std::slice::from_ref(&created));
        }
        Command::Done { id } => {
            engine.fetch_all().await?;
            let toggled = engine.toggle_done(id).await?;
            print_todos(std::slice::from_ref(&toggled));
        }
        Command::Rename { id, title } => {
            engine.fetch_all().await?;
            let renamed = engine.set_title(id, title).await?;
            print_todos(std::slice::from_ref(&renamed));
        }
        Command::Remove { id } => {
            let record = find(&engine, id).await?;
            engine.delete(&record).await?;
            println!("deleted {}", id);
        }
        Command::Image { id, out } => {
            let record = find(&engine, id).await?;
            let Some(path) = record.image_path() else {
                bail!("to-do {} has no image", id);
            };
            let image = engine
                .fetch_image(path)
                .await?
                .with_context(|| format!("to-do {} has no image", id))?;

            let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.{}", id, image.extension())));
            fs::write(&out, image.bytes())
                .with_context(|| format!("Failed to write {}", out.display()))?;
            let (width, height) = image.dimensions();
            println!("{} ({}x{}, {})", out.display(), width, height, image.content_type());
        }
    }

    Ok(())
}

async fn find(engine: &SyncEngine, id: i64) -> Result<TodoRecord> {
    engine.fetch_all().await?;
    engine
        .snapshot()
        .get(id)
        .cloned()
        .with_context(|| format!("no to-do with id {}", id))
}

fn load_image(path: &Path) -> Result<TodoItemImage> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    let image = TodoItemImage::from_bytes(bytes)
        .with_context(|| format!("{} is not a supported image", path.display()))?;
    info!(
        "[cli] Loaded {} as {} ({:?})",
        path.display(),
        image.content_type(),
        image.dimensions()
    );
    Ok(image)
}

fn print_todos(todos: &[TodoRecord]) {
    if todos.is_empty() {
        println!("no to-dos");
        return;
    }
    for todo in todos {
        let mark = if todo.done { "x" } else { " " };
        let id = todo.id().map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        match todo.image_path() {
            Some(path) => println!("[{}] {:>4}  {}  (image: {})", mark, id, todo.title, path),
            None => println!("[{}] {:>4}  {}", mark, id, todo.title),
        }
    }
}
