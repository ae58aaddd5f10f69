//! Cross-crate tests for cloakref: parsing and interpretation, the hiding transform, and
//! end-to-end equivalence of obfuscated modules.

/// Sample modules shared by the test suites.
pub mod fixtures {
    /// Counter bumped through a helper routine, reported to an external sink.
    pub const COUNTER: &str = r#"
module counter
@total = global i64 0
@step = constant i64 3
declare void @emit(i64)
define void @bump(i64) {
entry:
  %1 = load i64, @total
  %2 = load i64, @step
  %3 = add i64 %1, %0
  %4 = add i64 %3, %2
  store i64 %4, @total
  ret void
}
define i64 @main(i64) {
entry:
  call fn(i64) -> void @bump(%0)
  call fn(i64) -> void @bump(%0)
  %1 = load i64, @total
  call fn(i64) -> void @emit(%1)
  ret %1
}
"#;

    /// Loop over a constant table with direct and indirect calls.
    pub const LOOPS: &str = r#"
module loops
@acc = global i64 0
@i = global i64 0
@flags = global [2 x i8] zeroinitializer
@table = constant [4 x i64] [1, 2, 3, 4]
@handlers = constant [1 x ptr] [@square]
declare void @emit(i64)
define i64 @square(i64) {
entry:
  %1 = mul i64 %0, %0
  ret %1
}
define i64 @main(i64) {
entry:
  store i64 0, @i
  store i64 %0, @acc
  br head
head:
  %1 = load i64, @i
  %2 = icmp ult i64 %1, 4
  br %2, body, done
body:
  %3 = gep inbounds @table, %1 x 8
  %4 = load i64, %3
  %5 = call fn(i64) -> i64 @square(%4)
  %6 = load i64, @acc
  %7 = add i64 %6, %5
  store i64 %7, @acc
  call fn(i64) -> void @emit(%7)
  %8 = add i64 %1, 1
  store i64 %8, @i
  br head
done:
  %9 = load ptr, @handlers
  %10 = fncast %9 to fn(i64) -> i64
  %11 = call fn(i64) -> i64 %10(%0)
  %12 = trunc %11 to i8
  %13 = gep inbounds @flags, 1 x 1
  store i8 %12, %13
  %14 = load i64, @acc
  ret %14
}
"#;
}

#[cfg(test)]
mod analysis;
#[cfg(test)]
mod core;
#[cfg(test)]
mod e2e;
#[cfg(test)]
mod transforms;
