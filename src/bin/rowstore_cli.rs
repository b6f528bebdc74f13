//! Interactive REPL for the rowstore engine.
//!
//! Usage:
//!   rowstore_cli <db_path>
//!
//! Commands:
//!   insert <id> <username> <email>  - store a user row under its id
//!   select                          - list every row in key order
//!   select <min> <max>              - list rows with min <= id <= max
//!   .btree                          - print the tree structure as JSON
//!   .constants                      - print the engine layout constants
//!   .check                          - run the structural validator
//!   .exit                           - flush and quit

use rowstore::row::USER_ROW_SIZE;
use rowstore::{Config, Db, OpenMode, Row, StorageError, UserRow};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::exit;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: rowstore_cli <db_path>");
        exit(1);
    }

    let path = Path::new(&args[1]);
    let mode = if path.exists() {
        OpenMode::Open
    } else {
        OpenMode::Create
    };

    let db = match Db::open(Config::new(path, USER_ROW_SIZE).mode(mode)) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("ERROR: failed to open database: {e}");
            exit(1);
        }
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("db > ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("ERROR: {e}");
                break;
            }
            None => break,
        };

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        match run_command(&db, cmd) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => eprintln!("ERROR: {e}"),
        }
    }

    if let Err(e) = db.flush() {
        eprintln!("ERROR: flush failed: {e}");
        exit(1);
    }
}

/// Execute one REPL command; returns true when the session should end
fn run_command(db: &Db, cmd: &str) -> Result<bool, String> {
    if let Some(rest) = cmd.strip_prefix("insert") {
        let row: UserRow = rest.parse()?;
        let mut buf = vec![0u8; USER_ROW_SIZE as usize];
        row.write_to(&mut buf);

        match db.insert(row.primary_key(), &buf) {
            Ok(()) => println!("OK"),
            Err(StorageError::DuplicateKey(id)) => println!("DUPLICATE: id {id} already stored"),
            Err(e) => return Err(e.to_string()),
        }
        return Ok(false);
    }

    if let Some(rest) = cmd.strip_prefix("select") {
        let (min, max) = parse_range(rest)?;
        let rows = db.select(min, max).map_err(|e| e.to_string())?;
        for (_, bytes) in &rows {
            println!("{}", UserRow::read_from(bytes));
        }
        println!("COUNT: {}", rows.len());
        return Ok(false);
    }

    match cmd {
        ".exit" => Ok(true),
        ".btree" => {
            let shape = db.tree_shape().map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&shape).map_err(|e| e.to_string())?;
            println!("{json}");
            Ok(false)
        }
        ".constants" => {
            let stats = db.stats();
            println!("ROW_SIZE: {}", stats.row_size);
            println!("CELL_SIZE: {}", stats.cell_size);
            println!("LEAF_CAPACITY: {}", stats.leaf_capacity);
            println!("INNER_CAPACITY: {}", stats.inner_capacity);
            println!("LEAF_LOAD: {}", stats.leaf_load);
            println!("INNER_LOAD: {}", stats.inner_load);
            println!("NUM_PAGES: {}", stats.num_pages);
            println!("ROOT_PAGE: {}", stats.root_page_id);
            Ok(false)
        }
        ".check" => {
            if db.check_valid() {
                println!("VALID");
            } else {
                println!("INVALID");
            }
            Ok(false)
        }
        _ => {
            println!("Unrecognized command {cmd:?}.");
            Ok(false)
        }
    }
}

/// Parse the optional `<min> <max>` tail of a select command
fn parse_range(rest: &str) -> Result<(u32, u32), String> {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    match fields.as_slice() {
        [] => Ok((0, u32::MAX)),
        [min, max] => {
            let min = min.parse().map_err(|_| format!("bad min {min:?}"))?;
            let max = max.parse().map_err(|_| format!("bad max {max:?}"))?;
            Ok((min, max))
        }
        _ => Err("expected `select` or `select <min> <max>`".to_string()),
    }
}
