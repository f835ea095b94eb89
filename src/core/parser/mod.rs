//! JSH Parser
//!
//! Splits one input line into pipeline stages. Supported syntax:
//!
//! - words separated by blanks, with `'single'` and `"double"` quoting and `\` escapes
//! - `|` between stages
//! - `< file`, `> file`, `>> file` and `2> file` redirections

use std::iter::Peekable;
use std::str::Chars;

use log::debug;

use self::ast::{CommandDescriptor, CommandDescriptorBuilder, CommandPart};
use crate::errors::{Error, Result};

pub mod ast;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Pipe,
    Less,
    Great,
    DGreat,
    ErrGreat,
}

impl Token {
    fn as_str(&self) -> &str {
        match *self {
            Token::Word(ref w) => w,
            Token::Pipe => "|",
            Token::Less => "<",
            Token::Great => ">",
            Token::DGreat => ">>",
            Token::ErrGreat => "2>",
        }
    }
}

/// Parses `input` into the stages of a pipeline. A blank line yields no stages.
pub fn parse(input: &str) -> Result<Vec<CommandDescriptor>> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut commands = Vec::new();
    let mut builder = CommandDescriptorBuilder::new();
    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        let part = match token {
            Token::Word(w) => CommandPart::Word(w),
            Token::Pipe => {
                let command = builder.build().ok_or_else(|| Error::syntax("|"))?;
                commands.push(command);
                builder = CommandDescriptorBuilder::new();
                continue;
            }
            redirect => {
                let target = match tokens.next() {
                    Some(Token::Word(w)) => w,
                    Some(other) => return Err(Error::syntax(other.as_str())),
                    None => return Err(Error::syntax("newline")),
                };
                match redirect {
                    Token::Less => CommandPart::Input(target),
                    Token::Great => CommandPart::Output(target, false),
                    Token::DGreat => CommandPart::Output(target, true),
                    _ => CommandPart::Error(target),
                }
            }
        };
        builder = builder.update(part);
    }

    let trailing_pipe = !commands.is_empty() && builder.is_empty();
    match builder.build() {
        Some(command) => commands.push(command),
        None if trailing_pipe => return Err(Error::syntax("|")),
        None => return Err(Error::syntax(input.trim())),
    }

    debug!("parsed {} command(s): {:?}", commands.len(), commands);
    Ok(commands)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    // distinguishes an empty quoted word ('') from no word at all
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    macro_rules! flush {
        () => {
            if in_word {
                tokens.push(Token::Word(word.clone()));
                word.clear();
                in_word = false;
                quoted = false;
            }
        };
    }

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => flush!(),
            '|' => {
                flush!();
                tokens.push(Token::Pipe);
            }
            '<' => {
                flush!();
                tokens.push(Token::Less);
            }
            '>' => {
                if in_word && !quoted && word == "2" {
                    word.clear();
                    in_word = false;
                    tokens.push(Token::ErrGreat);
                    continue;
                }
                flush!();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::DGreat);
                } else {
                    tokens.push(Token::Great);
                }
            }
            '\'' => {
                read_quoted(&mut chars, '\'', &mut word)?;
                in_word = true;
                quoted = true;
            }
            '"' => {
                read_quoted(&mut chars, '"', &mut word)?;
                in_word = true;
                quoted = true;
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    word.push(escaped);
                }
                in_word = true;
                quoted = true;
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    flush!();

    Ok(tokens)
}

/// Reads up to the closing `quote`. Inside double quotes, `\"` and `\\` are escapes.
fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char, word: &mut String) -> Result<()> {
    while let Some(c) = chars.next() {
        match c {
            c if c == quote => return Ok(()),
            '\\' if quote == '"' => match chars.peek() {
                Some(&next) if next == '"' || next == '\\' => {
                    word.push(next);
                    chars.next();
                }
                _ => word.push('\\'),
            },
            c => word.push(c),
        }
    }

    Err(Error::syntax(quote.to_string()))
}
