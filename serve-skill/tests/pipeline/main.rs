mod data;
mod helpers;
mod run;
