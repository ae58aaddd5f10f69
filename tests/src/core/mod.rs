mod interp;
mod parser;
