// pdag — pipeline dependency-graph analysis
//
// Library root. Front end (lexer, parser, lower), expression layer (ir,
// scope, simplify, bounds), and the graph proper (span, arena, affine,
// jacobian, features, featurize, edge, node, dag).

pub mod affine;
pub mod arena;
pub mod ast;
pub mod bounds;
pub mod dag;
pub mod diag;
pub mod driver;
pub mod edge;
pub mod features;
pub mod featurize;
pub mod id;
pub mod ir;
pub mod jacobian;
pub mod lexer;
pub mod lower;
pub mod node;
pub mod parser;
pub mod scope;
pub mod simplify;
pub mod span;
pub mod target;
