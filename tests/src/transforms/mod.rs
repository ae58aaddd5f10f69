mod global_value_hide;
mod pipeline;
