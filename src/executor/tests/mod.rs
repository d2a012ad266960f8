//! Тесты исполнителя запросов
