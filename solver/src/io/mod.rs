pub mod luke;
