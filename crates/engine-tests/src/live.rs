//! Imports against real databases. Run with `--ignored` once the servers
//! behind `TEST_PG_URL` and `TEST_MYSQL_URL` are up.
