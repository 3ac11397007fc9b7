// Test modules for Chatwatch
// One module per source module, plus shared fakes in `helpers`

mod helpers;

mod model_tests;
