mod ast;
mod codegen;
mod ir;
mod lexer;
mod parser;

use std::fs;
use std::io::{self, Read};

use anyhow::Context;
use clap::{App, Arg};

use ast::Item;
use codegen::Codegen;
use lexer::Token;
use parser::Parser;

fn main() -> anyhow::Result<()> {
    let matches = App::new("lumen")
        .version("0.1.0")
        .about("front end for the lumen expression language")
        .arg(
            Arg::with_name("INPUT")
                .help("source file to compile; reads stdin when absent")
                .index(1),
        )
        .get_matches();

    let source = match matches.value_of("INPUT") {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let mut parser = Parser::from_source(&source);
    let mut codegen = Codegen::new();

    run(&mut parser, &mut codegen);

    print!("{}", codegen.program);
    Ok(())
}

/// One iteration per top-level unit. A failed unit prints one diagnostic
/// and leaves the rest of the session untouched.
fn run<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    loop {
        match parser.current() {
            Token::Eof => return,
            Token::Op(';') => parser.skip(),
            Token::Def => handle_definition(parser, codegen),
            Token::Extern => handle_extern(parser, codegen),
            _ => handle_toplevel(parser, codegen),
        }
    }
}

fn handle_definition<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    let func = match parser.parse_definition() {
        Ok(func) => func,
        Err(err) => {
            eprintln!("error: {}", err);
            parser.skip();
            return;
        }
    };
    match codegen.codegen(&Item::Function(func)) {
        Ok(id) => eprint!(
            "read function definition:\n{}",
            codegen.program.function_to_string(id)
        ),
        Err(err) => eprintln!("error: {}", err),
    }
}

fn handle_extern<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    let proto = match parser.parse_extern() {
        Ok(proto) => proto,
        Err(err) => {
            eprintln!("error: {}", err);
            parser.skip();
            return;
        }
    };
    match codegen.codegen(&Item::Extern(proto)) {
        Ok(id) => eprint!("read extern:\n{}", codegen.program.function_to_string(id)),
        Err(err) => eprintln!("error: {}", err),
    }
}

fn handle_toplevel<I: Iterator<Item = char>>(parser: &mut Parser<I>, codegen: &mut Codegen) {
    let func = match parser.parse_toplevel() {
        Ok(func) => func,
        Err(err) => {
            eprintln!("error: {}", err);
            parser.skip();
            return;
        }
    };
    match codegen.codegen(&Item::Function(func)) {
        Ok(id) => {
            eprint!(
                "read top-level expression:\n{}",
                codegen.program.function_to_string(id)
            );
            // the anonymous wrapper does not accumulate in the program
            codegen.program.erase(id);
        }
        Err(err) => eprintln!("error: {}", err),
    }
}
