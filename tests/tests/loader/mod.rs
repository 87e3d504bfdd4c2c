mod supersede;
