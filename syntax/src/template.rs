use combine::EasyParser;

use crate::parse::Error;

/// A piece of a command template.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Piece<'a> {
    /// Literal text, copied as is
    Text(&'a str),
    /// `{name}`, replaced by the value of `name`
    Var(&'a str),
}

/// Parse a command template. `{{` and `}}` stand for literal braces.
pub fn parse_template(text: &str) -> Result<Vec<Piece<'_>>, Error> {
    pieces::pieces()
        .easy_parse(text)
        .map(|(pieces, _)| pieces)
        .map_err(|e| {
            let pos = e.position.translate_position(text);
            Error::at(text, pos, format!("{}", e))
        })
}

mod pieces {
    use super::Piece;
    use crate::parse::prelude::*;
    use crate::parse::util::{braces, ident, lex_inline};

    p! {
        text() -> Piece<'a>, {
            recognize(skip_many1(none_of("{}".chars()))).map(Piece::Text)
        }
    }

    p! {
        escaped() -> Piece<'a>, {
            attempt(string("{{")).map(|_| Piece::Text("{"))
                .or(attempt(string("}}")).map(|_| Piece::Text("}")))
        }
    }

    p! {
        var() -> Piece<'a>, {
            braces(lex_inline(ident())).map(Piece::Var)
        }
    }

    p! {
        pieces() -> Vec<Piece<'a>>, {
            many(choice!(text(), escaped(), var())).skip(eof())
        }
    }
}
