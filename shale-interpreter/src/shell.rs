use std::io;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::Error;

use shale_interpreter::dispatch;
use shale_interpreter::evaluate::Execute;
use shale_interpreter::flow::Flow;
use shale_interpreter::runtime::Runtime;
use shale_core::pos::Pos;

/// Launches an interactive Read-Eval-Print-Loop within the given runtime.
pub fn interactive(rt: &mut Runtime, verbose: bool) -> Result<(), Error> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let mut counter = 0;
    let mut line = String::new();
    loop {
        write!(&mut stdout, "({}) shale | ", counter)?;
        stdout.flush()?;
        line.clear();
        stdin.read_line(&mut line)?;
        if line.is_empty() {
            writeln!(&mut stdout, "exit")?;
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" {
            break;
        }

        let start = Instant::now();
        let program = match shale_parser::parse(trimmed) {
            Ok(program) => program,
            Err(err) => {
                println!("ERROR: {}", err);
                continue;
            }
        };
        let elapsed = start.elapsed();
        if verbose {
            writeln!(
                &mut stdout,
                "Parsing time: {} ms ({} µs)",
                elapsed.as_millis(),
                elapsed.as_micros(),
            )?;
        }

        let start = Instant::now();
        rt.last_value = None;
        let mut failed = false;
        for stmt in &program.stmts {
            match stmt.execute(rt) {
                Flow::Go => {}
                Flow::Throw(err) => {
                    println!("{}", err.render(&rt.script_name));
                    failed = true;
                    break;
                }
                _ => unreachable!("loop flow escaped the top level"),
            }
        }
        let elapsed = start.elapsed();
        if verbose {
            writeln!(
                &mut stdout,
                "Execution time: {} ms ({} µs)",
                elapsed.as_millis(),
                elapsed.as_micros(),
            )?;
            writeln!(&mut stdout)?;
        }

        if !failed {
            if let Some(value) = rt.last_value.take() {
                match dispatch::obj_string(rt, &value, Pos::default()) {
                    Ok(text) => println!("{}", text),
                    Err(err) => println!("{}", err.render(&rt.script_name)),
                }
            }
        }
        counter += 1;
    }

    Ok(())
}
