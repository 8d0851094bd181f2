use combine::EasyParser;

use crate::ast::Document;

#[derive(Debug, thiserror::Error)]
#[error("ParseError on line '{line}': {msg}")]
pub struct Error {
    msg: String,
    pos: usize,
    line: String,
}

impl Error {
    /// Create an error for the line of `text` that contains `pos`.
    pub(crate) fn at(text: &str, pos: usize, msg: String) -> Self {
        let pos = pos.min(text.len());
        // isolate the line in question:
        let before = &text[0..pos];
        let after = &text[pos..text.len()];
        let prefix: String = before.chars().rev().take_while(|&c| c != '\n').collect();
        let prefix: String = prefix.chars().rev().collect();
        let suffix: String = after.chars().take_while(|&c| c != '\n').collect();
        let line = prefix + &suffix;
        Self { pos, line, msg }
    }

    /// Byte offset into the parsed text where the error was found.
    pub fn pos(&self) -> usize {
        self.pos
    }
}

/// Split `text` into sections. A leading byte order mark (as written by Excel) is ignored.
pub fn parse_document(text: &str) -> Result<Document<'_>, Error> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    document::document()
        .easy_parse(text)
        .map(|(doc, _remainder)| doc)
        .map_err(|e| {
            let pos = e.position.translate_position(text);
            // since converting combine's errors is a lifetime nightmare,
            // we just stringify the error before returning it.
            Error::at(text, pos, format!("{}", e))
        })
}

pub mod prelude {
    pub use combine::parser::char::{char, string};
    pub use combine::parser::range::recognize;
    pub use combine::*;
}

pub mod util {
    use super::prelude::*;
    use combine::parser::char::{alpha_num, letter};

    p! {
        ident_start() -> char, {
            char('_').or(letter())
        }
    }

    p! {
        ident_rest() -> Vec<char>, {
            many(char('_').or(alpha_num()))
        }
    }

    p! {
        ident() -> &'a str, {
            recognize(ident_start().and(ident_rest()))
        }
    }

    p! {
        line_internal_whitespace() -> (), {
            skip_many1(satisfy(|c: char| c.is_whitespace() && c != '\n'))
        }
    }

    wrapper! {
        lex_inline(parser), {
            optional(line_internal_whitespace())
                .with(parser)
                .skip(optional(line_internal_whitespace()))
        }
    }

    wrapper! {
        braces(parser), {
            char('{').with(parser).skip(char('}'))
        }
    }

    wrapper! {
        brackets(parser), {
            char('[').with(parser).skip(char(']'))
        }
    }

    p! {
        rest_of_line() -> &'a str, {
            recognize(skip_many(none_of("\n".chars())))
        }
    }

    p! {
        eol() -> (), {
            eof().or(char('\n').map(|_| ()))
        }
    }

    #[cfg(test)]
    mod test {
        use anyhow::Result;
        use combine::parser::char::char;
        use combine::EasyParser;
        #[test]
        fn test_ident() -> Result<()> {
            assert_eq!("run_dir", super::ident().easy_parse("run_dir").unwrap().0);
            assert_eq!("_r2", super::ident().easy_parse("_r2}").unwrap().0);
            assert!(super::ident().easy_parse("2r").is_err());
            Ok(())
        }
        #[test]
        fn test_lex_inline() -> Result<()> {
            assert_eq!('x', super::lex_inline(char('x')).easy_parse("  x  ").unwrap().0);
            assert!(super::lex_inline(char('x')).easy_parse("\nx").is_err());
            Ok(())
        }
        #[test]
        fn test_rest_of_line() -> Result<()> {
            assert_eq!(
                ("a,b,c", "\nnext"),
                super::rest_of_line().easy_parse("a,b,c\nnext").unwrap()
            );
            assert_eq!(("", ""), super::rest_of_line().easy_parse("").unwrap());
            Ok(())
        }
    }
}

mod document {
    use super::prelude::*;
    use super::util::{brackets, eol, line_internal_whitespace, rest_of_line};
    use crate::ast::{Document, Section};

    // anything after the closing bracket is ignored,
    // e.g. the trailing commas excel adds to "[Data],,,,"
    p! {
        header() -> &'a str, {
            optional(line_internal_whitespace())
                .with(brackets(recognize(skip_many1(none_of("]\n".chars())))))
                .skip(rest_of_line())
                .skip(eol())
        }
    }

    // must consume at least one char so `many` terminates at eof:
    p! {
        body_line() -> &'a str, {
            not_followed_by(char('[')).with(choice!(
                attempt(rest_of_line().skip(char('\n'))),
                recognize(skip_many1(none_of("\n".chars()))).skip(eof())
            ))
        }
    }

    p! {
        section() -> Section<'a>, {
            header()
                .and(many(body_line()))
                .map(|(name, lines)| Section { name, lines })
        }
    }

    p! {
        document() -> Document<'a>, {
            many(body_line())
                .and(many(section()))
                .skip(eof())
                .map(|(preamble, sections)| Document { preamble, sections })
        }
    }

}
