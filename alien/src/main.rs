use std::{process, sync::Arc};

use alien::{
    ExecutionResult, HeapCreateInfo, Instruction, Interpreter, SystemLoader, VMCreateInfo, Value,
    primitive_index,
};
use clap::Parser as ClapParser;
use log::{LevelFilter, info};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shared library to open, symbols are looked up globally without one
    #[arg(long)]
    library: Option<String>,

    /// Symbol to resolve, may be repeated
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Look symbols up by their exact name only
    #[arg(long)]
    raw: bool,

    /// Collect before every allocation
    #[arg(long)]
    stress_gc: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn send(name: &str) -> Instruction {
    match primitive_index(name) {
        Some(id) => Instruction::SendPrimitive { id },
        None => fail(format!("no primitive named {name}")),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

fn check(result: ExecutionResult) {
    if let Err(err) = result {
        fail(err);
    }
}

fn integer(interpreter: &Interpreter, value: Value) -> i128 {
    interpreter
        .vm
        .heap
        .integer_value(value)
        .unwrap_or_else(|| fail(format!("expected an integer, got {value:?}")))
}

fn resolve_symbols(interpreter: &mut Interpreter, cli: &Cli) {
    let library = match &cli.library {
        Some(path) => {
            check(interpreter.run(&[
                Instruction::PushBytes {
                    value: path.as_bytes().to_vec(),
                },
                send("dlopen"),
                send("dll-valid?"),
            ]));
            let valid = interpreter.pop().unwrap_or_else(|err| fail(err));
            if valid.is_false() {
                fail(format!("could not open {path}"));
            }
            interpreter.state.stack()[0]
        }
        None => Value::FALSE,
    };
    let lookup = if cli.raw { "dlsym-raw" } else { "dlsym" };

    for symbol in &cli.symbols {
        check(interpreter.run(&[Instruction::PushBytes {
            value: symbol.as_bytes().to_vec(),
        }]));
        check(interpreter.push(library));
        check(interpreter.execute(&send(lookup)));
        let found = interpreter.state.peek().unwrap_or_else(|err| fail(err));
        if found.is_false() {
            check(interpreter.pop().map(|_| ()));
            println!("{symbol}: not found");
            continue;
        }
        check(interpreter.execute(&send("alien-address")));
        let address = interpreter.pop().unwrap_or_else(|err| fail(err));
        println!("{symbol}: {:#x}", integer(interpreter, address));
    }

    if cli.library.is_some() {
        check(interpreter.execute(&send("dlclose")));
    }
}

// writes through an alien into a buffer, forces collections and reads it back
fn relocation_demo(interpreter: &mut Interpreter) {
    check(interpreter.run(&[
        Instruction::PushFixnum { value: 8 },
        Instruction::PushBytes { value: vec![0; 32] },
        send("<displaced-alien>"),
    ]));
    let alien = interpreter.state.stack()[0];

    check(interpreter.run(&[Instruction::PushFixnum { value: 0x1234_5678 }]));
    check(interpreter.push(alien));
    check(interpreter.run(&[Instruction::PushFixnum { value: 4 }, send("set-alien-unsigned-4")]));

    let before = interpreter.vm.heap.stats();
    for _ in 0..8 {
        check(interpreter.run(&[
            Instruction::PushBytes { value: vec![0xaa; 64] },
            Instruction::Drop,
        ]));
    }
    interpreter.vm.heap.collect(&mut interpreter.state);
    let after = interpreter.vm.heap.stats();
    info!(
        "{} collections, {} byte arrays relocated",
        after.collections - before.collections,
        after.arrays_relocated - before.arrays_relocated
    );

    check(interpreter.push(alien));
    check(interpreter.run(&[Instruction::PushFixnum { value: 4 }, send("alien-unsigned-4")]));
    let value = interpreter.pop().unwrap_or_else(|err| fail(err));
    println!(
        "read back {:#x} after {} relocations",
        integer(interpreter, value),
        after.arrays_relocated
    );
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let info = VMCreateInfo {
        heap: HeapCreateInfo {
            stress: cli.stress_gc,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut interpreter = Interpreter::new(info, Arc::new(SystemLoader::new()));

    if cli.symbols.is_empty() {
        relocation_demo(&mut interpreter);
    } else {
        resolve_symbols(&mut interpreter, &cli);
    }
}
