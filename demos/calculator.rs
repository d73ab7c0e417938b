//! Builds an arithmetic grammar and prints the match tree for an expression
//! given on the command line. Run with RUST_LOG=debug to watch the dispatch.

use packrat_peg::{alias, alt, not_pred, regex, seq, zero_or_more, Grammar, Match};

fn main() {
    env_logger::builder().init();

    let grammar = Grammar::build(|g| {
        g.define(
            "start",
            seq![alias("expr"), not_pred(regex("(?s).").unwrap())],
        );
        g.define(
            "expr",
            seq![
                alias("term"),
                zero_or_more(seq![alt!["+", "-"], alias("term")])
            ],
        );
        g.define(
            "term",
            seq![
                alias("factor"),
                zero_or_more(seq![alt!["*", "/"], alias("factor")])
            ],
        );
        g.define("factor", alt![seq!["(", alias("expr"), ")"], alias("number")]);
        g.define("number", regex("[0-9]+(\\.[0-9]+)?").unwrap());
    });

    let expression = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "2*(3+4)-1".to_string());

    println!("{grammar}");
    match grammar.parse(&expression) {
        Ok(matched) => print_tree(&matched, 0),
        Err(error) => eprintln!("{error}"),
    }
}

fn print_tree(matched: &Match<'_>, depth: usize) {
    println!(
        "{}{} {:?}",
        "  ".repeat(depth),
        matched.name().unwrap_or("-"),
        matched.text()
    );
    for child in matched.children() {
        print_tree(child, depth + 1);
    }
}
