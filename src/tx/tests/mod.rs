//! Тесты транзакционного слоя

pub mod lock_accessor_tests;
