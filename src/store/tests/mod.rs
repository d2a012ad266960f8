//! Тесты встроенного хранилища

pub mod engine_tests;
