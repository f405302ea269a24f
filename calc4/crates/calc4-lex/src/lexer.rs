//! The Calc4 lexer.
//!
//! Lexing is context-threaded: a `D[name|args|body]` definition
//! registers a placeholder implement in the compilation context *before*
//! its body is lexed, so the body can refer to the operator it defines
//! (this is what makes recursion work), and later tokens can call the
//! operator by `{name}` or by its single-character name.
//!
//! A definition body is lexed in place as a slice of the outer source
//! with a seeded cursor, so every token position is absolute.

use calc4_ast::{BinaryOp, CompilationContext, OperatorDefinition, OperatorImplement};
use calc4_util::{trim_spaces, CharPosition, Number, SyntaxError, SyntaxResult};

use crate::cursor::Cursor;
use crate::token::{Token, TokenKind};

/// Converts source text into a token sequence.
///
/// Definitions encountered along the way register placeholder implements
/// in `context`; callers that need failure atomicity should lex into a
/// clone and commit it on success.
pub fn lex<N: Number>(
    source: &str,
    context: &mut CompilationContext<N>,
) -> SyntaxResult<Vec<Token>> {
    let mut lexer = Lexer {
        cursor: Cursor::new(source),
        context,
        arguments: Vec::new(),
    };

    let tokens = lexer.lex_sequence()?;

    // The sequence lexer stops at ')' so parenthesis groups can nest;
    // at the outermost level a leftover character is an error.
    if !lexer.cursor.is_at_end() {
        return Err(SyntaxError::UnexpectedToken {
            token: lexer.cursor.current_char(),
            position: Some(lexer.cursor.position()),
        });
    }

    Ok(tokens)
}

struct Lexer<'s, 'c, N: Number> {
    cursor: Cursor<'s>,
    context: &'c mut CompilationContext<N>,
    arguments: Vec<String>,
}

impl<'s, 'c, N: Number> Lexer<'s, 'c, N> {
    fn lex_sequence(&mut self) -> SyntaxResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;
            if self.cursor.is_at_end() || self.cursor.current_char() == ')' {
                break;
            }
            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn skip_whitespace_and_comments(&mut self) -> SyntaxResult<()> {
        loop {
            match self.cursor.current_char() {
                ' ' | '\t' | '\r' | '\n' => self.cursor.advance(),
                '/' if self.cursor.char_at(1) == '/' => {
                    while !self.cursor.is_at_end() && self.cursor.current_char() != '\n' {
                        self.cursor.advance();
                    }
                }
                '/' if self.cursor.char_at(1) == '*' => {
                    // Block comments do not nest; the first "*/" closes.
                    let start = self.cursor.position();
                    self.cursor.advance();
                    self.cursor.advance();
                    loop {
                        if self.cursor.is_at_end() {
                            return Err(SyntaxError::TokenExpected {
                                name: "*/".to_string(),
                                position: Some(start),
                            });
                        }
                        if self.cursor.current_char() == '*' && self.cursor.char_at(1) == '/' {
                            self.cursor.advance();
                            self.cursor.advance();
                            break;
                        }
                        self.cursor.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> SyntaxResult<Token> {
        match self.cursor.current_char() {
            'D' => self.lex_define_token(),
            '0'..='9' => self.lex_decimal_token(),
            '{' => self.lex_braced_name_token(),
            '(' => self.lex_parenthesis_token(),
            _ => self.lex_symbol_or_argument_token(),
        }
    }

    fn lex_define_token(&mut self) -> SyntaxResult<Token> {
        let position = self.cursor.position();
        self.cursor.advance(); // 'D'

        let (text, text_start) = match self.lex_supplementary_slice()? {
            Some(found) => found,
            None => {
                return Err(SyntaxError::DefinitionTextNotSplittedProperly {
                    text: String::new(),
                    position: Some(position),
                })
            }
        };

        // The text must split into exactly three parts: name, argument
        // list, body.
        let bar_offsets: Vec<usize> = text
            .char_indices()
            .filter(|&(_, c)| c == '|')
            .map(|(offset, _)| offset)
            .collect();
        if bar_offsets.len() != 2 {
            return Err(SyntaxError::DefinitionTextNotSplittedProperly {
                text: text.to_string(),
                position: Some(position),
            });
        }

        let name = trim_spaces(&text[..bar_offsets[0]]).to_string();
        let args_text = &text[bar_offsets[0] + 1..bar_offsets[1]];
        let arguments: Vec<String> = if trim_spaces(args_text).is_empty() {
            Vec::new()
        } else {
            args_text
                .split(',')
                .map(|arg| trim_spaces(arg).to_string())
                .collect()
        };

        // Register a placeholder implement before lexing the body so the
        // body may call the operator being defined.
        let definition = OperatorDefinition::new(name.clone(), arguments.len());
        self.context
            .add_implement(OperatorImplement::new(definition, None));

        // Lex the body in place; positions refer to the outer source.
        let body_start = advance_position(text_start, &text[..bar_offsets[1] + 1]);
        let body_end = text_start.index + text.len();
        let tokens = {
            let mut inner = Lexer {
                cursor: Cursor::part(self.cursor.source(), body_start, body_end),
                context: &mut *self.context,
                arguments: arguments.clone(),
            };
            inner.lex_sequence()?
        };

        let supplementary_text = self.lex_supplementary_text()?;
        Ok(Token::new(
            TokenKind::Define {
                name,
                arguments,
                tokens,
            },
            position,
            supplementary_text,
        ))
    }

    fn lex_decimal_token(&mut self) -> SyntaxResult<Token> {
        let position = self.cursor.position();
        let value = self.cursor.current_char() as i32 - '0' as i32;
        self.cursor.advance();
        let supplementary_text = self.lex_supplementary_text()?;
        Ok(Token::new(
            TokenKind::Decimal { value },
            position,
            supplementary_text,
        ))
    }

    fn lex_braced_name_token(&mut self) -> SyntaxResult<Token> {
        let position = self.cursor.position();
        self.cursor.advance(); // '{'

        let begin = self.cursor.index();
        while !self.cursor.is_at_end() && self.cursor.current_char() != '}' {
            self.cursor.advance();
        }
        if self.cursor.is_at_end() {
            return Err(SyntaxError::TokenExpected {
                name: "}".to_string(),
                position: Some(self.cursor.position()),
            });
        }

        let name = self.cursor.source()[begin..self.cursor.index()].to_string();
        self.cursor.advance(); // '}'
        self.lex_token_from_given_name(name, position)
    }

    fn lex_parenthesis_token(&mut self) -> SyntaxResult<Token> {
        let position = self.cursor.position();
        self.cursor.advance(); // '('

        let tokens = self.lex_sequence()?;

        if self.cursor.is_at_end() || self.cursor.current_char() != ')' {
            return Err(SyntaxError::TokenExpected {
                name: ")".to_string(),
                position: Some(self.cursor.position()),
            });
        }
        self.cursor.advance(); // ')'

        let supplementary_text = self.lex_supplementary_text()?;
        Ok(Token::new(
            TokenKind::Parenthesis { tokens },
            position,
            supplementary_text,
        ))
    }

    fn lex_symbol_or_argument_token(&mut self) -> SyntaxResult<Token> {
        let position = self.cursor.position();

        let two_char_kind = match (self.cursor.current_char(), self.cursor.char_at(1)) {
            ('=', '=') => Some(TokenKind::BinaryOperator {
                op: BinaryOp::Equal,
            }),
            ('!', '=') => Some(TokenKind::BinaryOperator {
                op: BinaryOp::NotEqual,
            }),
            ('>', '=') => Some(TokenKind::BinaryOperator {
                op: BinaryOp::GreaterThanOrEqual,
            }),
            ('<', '=') => Some(TokenKind::BinaryOperator {
                op: BinaryOp::LessThanOrEqual,
            }),
            ('&', '&') => Some(TokenKind::BinaryOperator {
                op: BinaryOp::LogicalAnd,
            }),
            ('|', '|') => Some(TokenKind::BinaryOperator {
                op: BinaryOp::LogicalOr,
            }),
            ('-', '>') => Some(TokenKind::StoreArray),
            _ => None,
        };
        if let Some(kind) = two_char_kind {
            self.cursor.advance();
            self.cursor.advance();
            let supplementary_text = self.lex_supplementary_text()?;
            return Ok(Token::new(kind, position, supplementary_text));
        }

        let one_char_kind = match self.cursor.current_char() {
            '+' => Some(TokenKind::BinaryOperator { op: BinaryOp::Add }),
            '-' => Some(TokenKind::BinaryOperator { op: BinaryOp::Sub }),
            '*' => Some(TokenKind::BinaryOperator { op: BinaryOp::Mult }),
            '/' => Some(TokenKind::BinaryOperator { op: BinaryOp::Div }),
            '%' => Some(TokenKind::BinaryOperator { op: BinaryOp::Mod }),
            '<' => Some(TokenKind::BinaryOperator {
                op: BinaryOp::LessThan,
            }),
            '>' => Some(TokenKind::BinaryOperator {
                op: BinaryOp::GreaterThan,
            }),
            '?' => Some(TokenKind::ConditionalOperator),
            'P' => Some(TokenKind::PrintChar),
            'I' => Some(TokenKind::Input),
            'S' => Some(TokenKind::StoreVariable),
            'L' => Some(TokenKind::LoadVariable),
            '@' => Some(TokenKind::LoadArray),
            _ => None,
        };
        if let Some(kind) = one_char_kind {
            self.cursor.advance();
            let supplementary_text = self.lex_supplementary_text()?;
            return Ok(Token::new(kind, position, supplementary_text));
        }

        // Any other byte names a user-defined operator or an argument.
        let name = self.cursor.current_char().to_string();
        self.cursor.advance();
        self.lex_token_from_given_name(name, position)
    }

    fn lex_token_from_given_name(
        &mut self,
        name: String,
        position: CharPosition,
    ) -> SyntaxResult<Token> {
        let definition = self
            .context
            .implement(&name)
            .map(|implement| implement.definition().clone());
        if let Some(definition) = definition {
            let supplementary_text = self.lex_supplementary_text()?;
            return Ok(Token::new(
                TokenKind::UserDefinedOperator { definition },
                position,
                supplementary_text,
            ));
        }

        if let Some(index) = self.arguments.iter().position(|arg| *arg == name) {
            let supplementary_text = self.lex_supplementary_text()?;
            return Ok(Token::new(
                TokenKind::Argument { name, index },
                position,
                supplementary_text,
            ));
        }

        Err(SyntaxError::OperatorOrOperandNotDefined {
            name,
            position: Some(position),
        })
    }

    /// Reads a `[...]` group if one immediately follows, returning its
    /// contents as a slice of the source plus the contents' start
    /// position.
    fn lex_supplementary_slice(&mut self) -> SyntaxResult<Option<(&'s str, CharPosition)>> {
        if self.cursor.current_char() != '[' {
            return Ok(None);
        }
        self.cursor.advance(); // '['

        let start = self.cursor.position();
        while !self.cursor.is_at_end() && self.cursor.current_char() != ']' {
            self.cursor.advance();
        }
        if self.cursor.is_at_end() {
            return Err(SyntaxError::TokenExpected {
                name: "]".to_string(),
                position: Some(self.cursor.position()),
            });
        }

        let text = &self.cursor.source()[start.index..self.cursor.index()];
        self.cursor.advance(); // ']'
        Ok(Some((text, start)))
    }

    fn lex_supplementary_text(&mut self) -> SyntaxResult<String> {
        Ok(self
            .lex_supplementary_slice()?
            .map(|(text, _)| text.to_string())
            .unwrap_or_default())
    }
}

/// Position reached after walking `text` from `start`.
fn advance_position(start: CharPosition, text: &str) -> CharPosition {
    let mut line = start.line_no;
    let mut column = start.char_no;
    for c in text.chars() {
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    CharPosition::new(start.index + text.len(), line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex64(source: &str) -> SyntaxResult<Vec<Token>> {
        let mut context: CompilationContext<i64> = CompilationContext::new();
        lex(source, &mut context)
    }

    #[test]
    fn lexes_simple_expression() {
        let tokens = lex64("1+2*3-10").unwrap();
        let kinds: Vec<usize> = tokens.iter().map(Token::num_operands).collect();
        assert_eq!(tokens.len(), 8);
        assert_eq!(kinds, [1, 2, 1, 2, 1, 2, 1, 1]);
        assert_eq!(tokens[0].kind, TokenKind::Decimal { value: 1 });
        assert_eq!(
            tokens[1].kind,
            TokenKind::BinaryOperator { op: BinaryOp::Add }
        );
    }

    #[test]
    fn skips_whitespace_and_comments() {
        let tokens = lex64("1 +\t2\r\n// line comment\n+ /* block */ 3").unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[4].kind, TokenKind::Decimal { value: 3 });
    }

    #[test]
    fn tracks_positions() {
        let tokens = lex64("1 +\n2").unwrap();
        assert_eq!(tokens[0].position, CharPosition::new(0, 1, 1));
        assert_eq!(tokens[1].position, CharPosition::new(2, 1, 3));
        assert_eq!(tokens[2].position, CharPosition::new(4, 2, 1));
    }

    #[test]
    fn two_char_operators_win_over_one_char() {
        let tokens = lex64("1<=2").unwrap();
        assert_eq!(
            tokens[1].kind,
            TokenKind::BinaryOperator {
                op: BinaryOp::LessThanOrEqual
            }
        );

        let tokens = lex64("5->0").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::StoreArray);
    }

    #[test]
    fn store_and_load_use_supplementary_text_as_name() {
        let tokens = lex64("1S[var]L[var]L").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::StoreVariable);
        assert_eq!(tokens[1].supplementary_text, "var");
        assert_eq!(tokens[2].supplementary_text, "var");
        assert_eq!(tokens[3].supplementary_text, "");
    }

    #[test]
    fn define_registers_operator_and_lexes_body() {
        let mut context: CompilationContext<i64> = CompilationContext::new();
        let tokens = lex("D[add|x, y|x+y] 1{add}2", &mut context).unwrap();

        let implement = context.implement("add").unwrap();
        assert_eq!(implement.definition().num_operands(), 2);
        assert!(implement.operator().is_none()); // body is the parser's job

        match &tokens[0].kind {
            TokenKind::Define {
                name,
                arguments,
                tokens,
            } => {
                assert_eq!(name, "add");
                assert_eq!(arguments, &["x", "y"]);
                assert_eq!(tokens.len(), 3);
                assert_eq!(
                    tokens[0].kind,
                    TokenKind::Argument {
                        name: "x".to_string(),
                        index: 0
                    }
                );
            }
            other => panic!("expected define token, got {:?}", other),
        }

        match &tokens[2].kind {
            TokenKind::UserDefinedOperator { definition } => {
                assert_eq!(definition.name(), "add");
                assert_eq!(definition.num_operands(), 2);
            }
            other => panic!("expected user-defined operator, got {:?}", other),
        }
    }

    #[test]
    fn empty_argument_list_means_arity_zero() {
        let mut context: CompilationContext<i64> = CompilationContext::new();
        lex("D[five||5]", &mut context).unwrap();
        assert_eq!(context.implement("five").unwrap().definition().num_operands(), 0);
    }

    #[test]
    fn recursive_definition_resolves_itself() {
        let mut context: CompilationContext<i64> = CompilationContext::new();
        let tokens = lex("D[fib|n|n<=1?n?(n-1){fib}+(n-2){fib}]", &mut context).unwrap();
        match &tokens[0].kind {
            TokenKind::Define { tokens, .. } => {
                assert!(tokens.iter().any(|t| matches!(
                    &t.kind,
                    TokenKind::UserDefinedOperator { definition } if definition.name() == "fib"
                )));
            }
            other => panic!("expected define token, got {:?}", other),
        }
    }

    #[test]
    fn single_byte_name_calls_user_defined_operator() {
        // A multi-byte operator name is only reachable through braces,
        // so a bare '#' must fail when only "+#" is defined.
        let mut context: CompilationContext<i64> = CompilationContext::new();
        let err = lex("D[+#|x|x+1] 2#", &mut context).unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::OperatorOrOperandNotDefined { ref name, .. } if name == "#"
        ));

        let mut context: CompilationContext<i64> = CompilationContext::new();
        let tokens = lex("D[#|x|x+1] 2#", &mut context).unwrap();
        assert!(matches!(
            &tokens[1].kind,
            TokenKind::UserDefinedOperator { definition } if definition.name() == "#"
        ));
    }

    #[test]
    fn body_positions_are_absolute() {
        let mut context: CompilationContext<i64> = CompilationContext::new();
        //          0123456789
        let tokens = lex("D[f|x|x+1]", &mut context).unwrap();
        match &tokens[0].kind {
            TokenKind::Define { tokens, .. } => {
                assert_eq!(tokens[0].position.index, 6); // 'x'
                assert_eq!(tokens[1].position.index, 7); // '+'
                assert_eq!(tokens[2].position.index, 8); // '1'
            }
            other => panic!("expected define token, got {:?}", other),
        }
    }

    #[test]
    fn error_unknown_name() {
        let err = lex64("{notdefined}").unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::OperatorOrOperandNotDefined { ref name, .. } if name == "notdefined"
        ));
    }

    #[test]
    fn error_bad_definition_text() {
        let err = lex64("D[op|x, y]").unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::DefinitionTextNotSplittedProperly { ref text, .. } if text == "op|x, y"
        ));
    }

    #[test]
    fn error_missing_close_paren() {
        let err = lex64("(1+2").unwrap_err();
        assert!(matches!(err, SyntaxError::TokenExpected { ref name, .. } if name == ")"));
    }

    #[test]
    fn error_stray_close_paren() {
        let err = lex64("1+2)").unwrap_err();
        assert!(matches!(
            err,
            SyntaxError::UnexpectedToken {
                token: ')',
                position: Some(position),
            } if position.index == 3
        ));
    }

    #[test]
    fn error_unterminated_block_comment() {
        let err = lex64("1 /* never closed").unwrap_err();
        assert!(matches!(err, SyntaxError::TokenExpected { ref name, .. } if name == "*/"));
    }

    #[test]
    fn block_comments_do_not_nest() {
        // The first "*/" closes the comment; the rest lexes as tokens.
        let tokens = lex64("1 /* a /* b */ +2").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[2].kind, TokenKind::Decimal { value: 2 });
    }
}
