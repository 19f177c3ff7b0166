use clap::Parser;
use easy_repl::{command, CommandStatus, Repl};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

#[derive(Parser, Debug, Clone)]
#[command()]
pub(crate) struct Args {
    #[clap(short, long)]
    pub(crate) db_path: String,
}

fn print_block(block: Option<(String, Vec<u8>)>) {
    match block {
        Some((block_id, bytes)) => {
            println!("Block id: {block_id}");
            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(json) => println!("{json:#}"),
                Err(err) => println!("Undecodable block: {err}"),
            }
        }
        None => println!("Block not found"),
    }
}

fn main() {
    let db_path = Args::parse().db_path;

    let connection = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .expect("Failed to open block log");
    let connection = &connection;

    let mut repl = Repl::builder()
        .add(
            "get",
            command! {
                "Get the block at a height",
                (height: u32) => |height| {
                    let block = connection
                        .query_row(
                            "SELECT block_id, block FROM blocks WHERE height = ?1",
                            params![height],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;
                    print_block(block);
                    Ok(CommandStatus::Done)
                }
            },
        )
        .add(
            "head",
            command! {
                "Get the last block",
                () => || {
                    let block = connection
                        .query_row(
                            "SELECT block_id, block FROM blocks WHERE height = (SELECT max(height) FROM blocks)",
                            params![],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?;
                    print_block(block);
                    Ok(CommandStatus::Done)
                }
            },
        )
        .add(
            "count",
            command! {
                "Number of blocks in the log",
                () => || {
                    let count: u32 = connection.query_row("SELECT count(*) FROM blocks", params![], |row| row.get(0))?;
                    println!("Blocks: {count}");
                    Ok(CommandStatus::Done)
                }
            },
        )
        .build()
        .expect("Failed to create repl");

    repl.run().expect("Critical REPL error");
}
