//! calc4-par - Arity-Driven Parser
//!
//! Builds the expression tree from a token sequence. The parser never
//! consults a precedence table: the precedence of an operator *is* its
//! arity. At each level the maximum arity among the tokens decides which
//! tokens act as pivots; runs of strictly-lower-arity tokens between
//! pivots are parsed recursively as operands, and equal-arity pivots
//! chain left-to-right.
//!
//! Two special rules:
//!
//! - a missing first operand is legal when the sequence starts with a
//!   decimal digit; a synthetic zero is supplied, which is how `123`
//!   (three arity-1 digit tokens) parses to `((0*10+1)*10+2)*10+3`;
//! - when more than one result remains after all tokens are consumed,
//!   the results are wrapped in a parenthesis node (sequencing).
//!
//! Before the main pass, every definition token at the current level has
//! its inner tokens parsed and the context's placeholder implement
//! replaced with the finished tree.

mod edge_cases;

use std::rc::Rc;

use calc4_ast::{CompilationContext, Expr, OperatorImplement};
use calc4_lex::{Token, TokenKind};
use calc4_util::{Number, SyntaxError, SyntaxResult};

/// Parses a token sequence into an expression tree.
///
/// Definition bodies encountered in `tokens` are parsed first and their
/// implements in `context` are completed.
pub fn parse<N: Number>(
    tokens: &[Token],
    context: &mut CompilationContext<N>,
) -> SyntaxResult<Rc<Expr<N>>> {
    Parser::new(tokens, context).parse()
}

struct Parser<'t, 'c, N: Number> {
    tokens: &'t [Token],
    context: &'c mut CompilationContext<N>,
    max_num_operands: usize,
    index: usize,
}

impl<'t, 'c, N: Number> Parser<'t, 'c, N> {
    fn new(tokens: &'t [Token], context: &'c mut CompilationContext<N>) -> Self {
        let max_num_operands = tokens.iter().map(Token::num_operands).max().unwrap_or(0);
        Self {
            tokens,
            context,
            max_num_operands,
            index: 0,
        }
    }

    fn parse(&mut self) -> SyntaxResult<Rc<Expr<N>>> {
        self.parse_definitions()?;

        let mut results: Vec<Rc<Expr<N>>> = Vec::new();

        if self.max_num_operands == 0 {
            // Every token stands alone.
            while self.index < self.tokens.len() {
                let token = &self.tokens[self.index];
                self.index += 1;
                results.push(self.create_operator(token, Vec::new())?);
            }
        } else {
            let mut operands: Vec<Rc<Expr<N>>> = Vec::new();

            let lower = self.read_lower();
            if lower.is_empty() {
                if matches!(
                    self.tokens.first().map(|t| &t.kind),
                    Some(TokenKind::Decimal { .. })
                ) {
                    // A leading digit gets a synthetic zero operand.
                    operands.push(Rc::new(Expr::Zero));
                } else {
                    return Err(SyntaxError::SomeOperandsMissing {
                        position: self.tokens.first().map(|t| t.position),
                    });
                }
            } else {
                operands.push(Parser::new(lower, &mut *self.context).parse()?);
            }

            while self.index < self.tokens.len() {
                let token = &self.tokens[self.index];
                self.index += 1;

                // A token needing fewer operands than this level provides
                // ends the current chain and starts a new sequence
                // element: in `7S L` the store is finished and the load
                // begins the next element rather than consuming it.
                if token.num_operands() < self.max_num_operands {
                    results.append(&mut operands);
                    operands.push(self.create_operator(token, Vec::new())?);
                    continue;
                }

                // Collect operands until the pivot's arity is satisfied.
                while operands.len() < self.max_num_operands {
                    let lower = self.read_lower();
                    if lower.is_empty() {
                        return Err(SyntaxError::SomeOperandsMissing {
                            position: Some(token.position),
                        });
                    }

                    operands.push(Parser::new(lower, &mut *self.context).parse()?);
                    if operands.len() < self.max_num_operands {
                        // Consume the separator pivot between operands.
                        self.index += 1;
                    }
                }

                // The pivot's result becomes the left operand of the next
                // equal-arity operator: left-to-right associativity.
                let op = self.create_operator(token, std::mem::take(&mut operands))?;
                operands.push(op);
            }

            results.append(&mut operands);
        }

        match results.len() {
            0 => Err(SyntaxError::CodeIsEmpty),
            1 => Ok(results.remove(0)),
            _ => Ok(Rc::new(Expr::Parenthesis { exprs: results })),
        }
    }

    /// Parses the body of every definition token at this level and
    /// completes the context's placeholder implement.
    fn parse_definitions(&mut self) -> SyntaxResult<()> {
        let tokens = self.tokens;
        for token in tokens {
            if let TokenKind::Define {
                name,
                tokens: body_tokens,
                ..
            } = &token.kind
            {
                let body = Parser::new(body_tokens, &mut *self.context).parse()?;
                let definition = self
                    .context
                    .implement(name)
                    .map(|implement| implement.definition().clone())
                    .expect("definition is registered by the lexer before parsing");
                self.context
                    .add_implement(OperatorImplement::new(definition, Some(body)));
            }
        }
        Ok(())
    }

    /// Reads the run of tokens whose arity is strictly below the current
    /// level's maximum.
    ///
    /// The separator skip in the main loop may leave `index` past the end
    /// of the sequence, so both bounds are clamped.
    fn read_lower(&mut self) -> &'t [Token] {
        let len = self.tokens.len();
        let start = self.index.min(len);
        while self.index < len && self.tokens[self.index].num_operands() < self.max_num_operands {
            self.index += 1;
        }
        &self.tokens[start..self.index.min(len)]
    }

    fn create_operator(
        &mut self,
        token: &Token,
        operands: Vec<Rc<Expr<N>>>,
    ) -> SyntaxResult<Rc<Expr<N>>> {
        let expr = match &token.kind {
            TokenKind::Argument { index, .. } => Rc::new(Expr::Operand { index: *index }),
            TokenKind::Define { .. } => Rc::new(Expr::Define),
            TokenKind::Parenthesis { tokens } => {
                return Parser::new(tokens, &mut *self.context).parse()
            }
            TokenKind::Decimal { value } => Rc::new(Expr::Decimal {
                operand: operands[0].clone(),
                digit: *value,
            }),
            TokenKind::BinaryOperator { op } => Rc::new(Expr::Binary {
                left: operands[0].clone(),
                right: operands[1].clone(),
                op: *op,
            }),
            TokenKind::ConditionalOperator => Rc::new(Expr::Conditional {
                condition: operands[0].clone(),
                if_true: operands[1].clone(),
                if_false: operands[2].clone(),
            }),
            TokenKind::UserDefinedOperator { definition } => Rc::new(Expr::UserDefined {
                definition: definition.clone(),
                operands,
                is_tail_call: None,
            }),
            TokenKind::LoadVariable => Rc::new(Expr::LoadVariable {
                name: token.supplementary_text.clone(),
            }),
            TokenKind::StoreVariable => Rc::new(Expr::StoreVariable {
                operand: operands[0].clone(),
                name: token.supplementary_text.clone(),
            }),
            TokenKind::LoadArray => Rc::new(Expr::LoadArray {
                index: operands[0].clone(),
            }),
            TokenKind::StoreArray => Rc::new(Expr::StoreArray {
                value: operands[0].clone(),
                index: operands[1].clone(),
            }),
            TokenKind::PrintChar => Rc::new(Expr::PrintChar {
                character: operands[0].clone(),
            }),
            TokenKind::Input => Rc::new(Expr::Input),
        };
        Ok(expr)
    }
}
