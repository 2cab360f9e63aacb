#[cfg(windows)]
fn main() {
    use std::env::args;
    use wbem_bridge::{ComRuntime, QueryMode, WbemConnection};

    simple_logger::init_with_level(log::Level::Warn).unwrap();

    let args: Vec<String> = args().collect();
    let query = match args.get(1) {
        None => {
            println!("Expected an argument with a WQL query");
            return;
        }
        Some(query) => query,
    };

    let con = WbemConnection::localhost(ComRuntime::new().unwrap()).unwrap();

    let rows = match con.exec_query(query, QueryMode::Blocking) {
        Err(e) => {
            println!("Couldn't run query {} because of {}", query, e);
            return;
        }
        Ok(rows) => rows,
    };

    for (i, row) in rows.iter().enumerate() {
        println!("Result {}", i);
        for (name, value) in row.iter() {
            println!("  {} = {:?}", name, value);
        }
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("wqlq only runs on Windows");
}
